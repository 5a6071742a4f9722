/*!
 * Device Configuration
 *
 * Runtime configuration for the timer device: tick resolution, re-arm
 * policy and the deferred-callback worker pool.
 */

use super::limits::*;
use serde::{Deserialize, Serialize};
use miette::Diagnostic;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// What `control(SET_TIMER)` does when a timer is already pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// Synchronously cancel the pending timer, then arm the new one
    #[default]
    Replace,
    /// Leave the pending timer alone and fail with `TimerAlreadyPending`
    Reject,
}

/// Unrecognised re-arm policy name
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[error("Unknown re-arm policy '{0}'")]
#[diagnostic(code(config::rearm_policy), help("Expected `replace` or `reject`."))]
pub struct ParsePolicyError(pub String);

impl FromStr for RearmPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(RearmPolicy::Replace),
            "reject" => Ok(RearmPolicy::Reject),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// Timer device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Scheduler tick rate; durations round up to whole ticks
    pub tick_hz: u32,
    /// Policy for arming while a timer is pending
    pub rearm_policy: RearmPolicy,
    /// Worker threads running deferred callbacks
    pub worker_threads: usize,
    /// Name given to worker threads
    pub thread_name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            tick_hz: DEFAULT_TICK_HZ,
            rearm_policy: RearmPolicy::Replace,
            worker_threads: DEFAULT_TIMER_WORKERS,
            thread_name: DEFAULT_TIMER_THREAD_NAME.to_string(),
        }
    }
}

impl DeviceConfig {
    /// Configuration that refuses to re-arm a pending timer
    pub fn strict() -> Self {
        Self {
            rearm_policy: RearmPolicy::Reject,
            ..Self::default()
        }
    }

    /// Configuration with kernel-like coarse ticks (4ms at 250 Hz)
    pub fn coarse() -> Self {
        Self {
            tick_hz: COARSE_TICK_HZ,
            ..Self::default()
        }
    }

    pub fn with_tick_hz(mut self, tick_hz: u32) -> Self {
        self.tick_hz = tick_hz.max(1);
        self
    }

    pub fn with_rearm_policy(mut self, policy: RearmPolicy) -> Self {
        self.rearm_policy = policy;
        self
    }

    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers.max(1);
        self
    }

    /// Default configuration overlaid with environment overrides
    ///
    /// Environment variables:
    /// - TIMER_TICK_HZ: scheduler tick rate (default: 1000)
    /// - TIMER_REARM_POLICY: `replace` or `reject` (default: replace)
    /// - TIMER_WORKER_THREADS: callback worker count (default: 1)
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup; unparsable values are ignored
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TICK_HZ) {
            match raw.trim().parse::<u32>() {
                Ok(hz) => self = self.with_tick_hz(hz),
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_TICK_HZ),
            }
        }

        if let Some(raw) = lookup(ENV_REARM_POLICY) {
            match raw.parse::<RearmPolicy>() {
                Ok(policy) => self.rearm_policy = policy,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_REARM_POLICY),
            }
        }

        if let Some(raw) = lookup(ENV_WORKER_THREADS) {
            match raw.trim().parse::<usize>() {
                Ok(workers) => self = self.with_worker_threads(workers),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Ignoring invalid {}", ENV_WORKER_THREADS)
                }
            }
        }

        self
    }
}
