/*!
 * Timer Scheduler
 *
 * Arms and cancels a single one-shot deferred callback on a dedicated
 * tokio runtime (the device's work queue).
 *
 * # Synchronous Cancellation
 *
 * `cancel()` does not return until the timer task has been dropped by the
 * runtime. Every task owns a drop latch that is signalled when its future
 * is dropped, whether it completed or was aborted:
 *
 * 1. Abort the task's `JoinHandle`
 * 2. Block on the task's latch
 *
 * On return the callback has either run to completion or will never run.
 *
 * # Ticks
 *
 * Durations are converted to scheduler ticks the way `msecs_to_jiffies`
 * does, rounding up, so a timer never fires before the requested delay.
 */

use crate::core::config::{DeviceConfig, RearmPolicy};
use crate::core::errors::{DeviceError, DeviceResult};
use crate::core::sync::RendezvousChannel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Deadline stand-in for delays too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deferred callback run when a timer expires, given the timer's id
///
/// Ids increase with every arm, so a callback can tell a newer timer from an
/// older one.
pub type TimerCallback = Arc<dyn Fn(u64) + Send + Sync + 'static>;

/// Scheduler tick rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    hz: u32,
}

impl TickRate {
    pub fn new(hz: u32) -> Self {
        Self { hz: hz.max(1) }
    }

    #[inline]
    pub fn hz(&self) -> u32 {
        self.hz
    }

    /// Milliseconds to ticks, rounded up
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        let ticks = (ms as u128 * self.hz as u128).div_ceil(1000);
        ticks.min(u64::MAX as u128) as u64
    }

    /// Wall-clock length of `ticks`
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let nanos = ticks as u128 * 1_000_000_000 / self.hz as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Length of a single tick
    pub fn resolution(&self) -> Duration {
        self.ticks_to_duration(1)
    }
}

/// A timer accepted by [`TimerScheduler::arm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub id: u64,
    pub ticks: u64,
    pub delay: Duration,
    /// A pending timer was cancelled to make room for this one
    pub replaced: bool,
}

/// What [`TimerScheduler::cancel`] found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing was armed
    Idle,
    /// A pending timer was stopped before its callback ran
    Cancelled,
    /// The callback had already run (or was running and has now finished)
    AlreadyFired,
}

/// Signals the latch when the owning task future is dropped
struct DropLatch(Arc<RendezvousChannel>);

impl Drop for DropLatch {
    fn drop(&mut self) {
        self.0.signal();
    }
}

struct PendingTimer {
    id: u64,
    deadline: Instant,
    task: JoinHandle<()>,
    dropped: Arc<RendezvousChannel>,
    fired: Arc<AtomicBool>,
}

impl PendingTimer {
    fn is_active(&self) -> bool {
        !self.fired.load(Ordering::Acquire) && !self.dropped.is_signalled()
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Abort and wait until the task is gone
    fn cancel_sync(&self) -> DeviceResult<CancelOutcome> {
        self.task.abort();
        self.dropped.wait_and_consume()?;

        if self.fired.load(Ordering::Acquire) {
            Ok(CancelOutcome::AlreadyFired)
        } else {
            Ok(CancelOutcome::Cancelled)
        }
    }
}

/// One-shot timer scheduler
pub struct TimerScheduler {
    runtime: Option<Runtime>,
    callback: TimerCallback,
    tick_rate: TickRate,
    policy: RearmPolicy,
    pending: Mutex<Option<PendingTimer>>,
    next_id: AtomicU64,
}

impl TimerScheduler {
    /// Start the worker runtime and bind the expiry callback
    pub fn new<F>(config: &DeviceConfig, callback: F) -> DeviceResult<Self>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_time()
            .build()?;

        info!(
            tick_hz = config.tick_hz,
            policy = ?config.rearm_policy,
            workers = config.worker_threads,
            "Timer scheduler started"
        );

        Ok(Self {
            runtime: Some(runtime),
            callback: Arc::new(callback),
            tick_rate: TickRate::new(config.tick_hz),
            policy: config.rearm_policy,
            pending: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    #[inline]
    pub fn tick_rate(&self) -> TickRate {
        self.tick_rate
    }

    #[inline]
    pub fn policy(&self) -> RearmPolicy {
        self.policy
    }

    /// Schedule the callback to run once after `duration_ms`
    ///
    /// A zero duration fires on the next worker turn. Negative durations are
    /// rejected. While a timer is pending the configured [`RearmPolicy`]
    /// decides between replacing it and failing with `TimerAlreadyPending`.
    pub fn arm(&self, duration_ms: i64) -> DeviceResult<ArmedTimer> {
        if duration_ms < 0 {
            return Err(DeviceError::InvalidDuration(duration_ms));
        }

        let runtime = self.runtime.as_ref().ok_or(DeviceError::DeviceShutdown)?;
        let ticks = self.tick_rate.ms_to_ticks(duration_ms as u64);
        let delay = self.tick_rate.ticks_to_duration(ticks);

        let mut pending = self.pending.lock();

        let mut replaced = false;
        if let Some(existing) = pending.as_ref() {
            if existing.is_active() && self.policy == RearmPolicy::Reject {
                return Err(DeviceError::TimerAlreadyPending {
                    remaining_ms: existing.remaining().as_millis() as u64,
                });
            }

            let outcome = existing.cancel_sync()?;
            replaced = outcome == CancelOutcome::Cancelled;
            if replaced {
                debug!(timer_id = existing.id, "Replaced pending timer");
            }
            *pending = None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(RendezvousChannel::new());
        let fired = Arc::new(AtomicBool::new(false));

        let task = {
            let latch = DropLatch(dropped.clone());
            let fired = fired.clone();
            let callback = self.callback.clone();
            runtime.spawn(async move {
                let _latch = latch;
                tokio::time::sleep(delay).await;
                fired.store(true, Ordering::Release);
                debug!(timer_id = id, "Timer expired, running deferred callback");
                callback(id);
            })
        };

        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);

        *pending = Some(PendingTimer {
            id,
            deadline,
            task,
            dropped,
            fired,
        });

        debug!(timer_id = id, duration_ms, ticks, ?delay, "Timer armed");

        Ok(ArmedTimer {
            id,
            ticks,
            delay,
            replaced,
        })
    }

    /// Cancel the pending timer and wait until its task is gone
    ///
    /// On return the callback is guaranteed not to run afterwards. If the
    /// wait cannot be confirmed the timer stays tracked and the error is
    /// returned so teardown can stop.
    pub fn cancel(&self) -> DeviceResult<CancelOutcome> {
        let mut pending = self.pending.lock();
        let Some(timer) = pending.as_ref() else {
            return Ok(CancelOutcome::Idle);
        };

        let outcome = timer.cancel_sync()?;
        debug!(timer_id = timer.id, ?outcome, "Timer cancelled");
        *pending = None;
        Ok(outcome)
    }

    /// Whether a timer is armed and has not fired yet
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(PendingTimer::is_active)
            .unwrap_or(false)
    }

    /// Time left before the pending timer fires
    pub fn remaining(&self) -> Option<Duration> {
        self.pending
            .lock()
            .as_ref()
            .filter(|timer| timer.is_active())
            .map(PendingTimer::remaining)
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.cancel() {
            warn!(error = %e, "Pending timer could not be confirmed cancelled on drop");
        }
        // Non-blocking, safe from async contexts too
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("tick_rate", &self.tick_rate)
            .field("policy", &self.policy)
            .field("pending", &self.is_pending())
            .finish()
    }
}
