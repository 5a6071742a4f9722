/*!
 * Lock-Free Device Statistics
 * Atomic counters updated from both the caller and the timer callback context
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic device counters
///
/// All operations use relaxed ordering; counters are diagnostics only and
/// never drive control flow.
#[derive(Debug, Default)]
#[repr(C, align(64))]
pub struct DeviceStats {
    opens: AtomicU64,
    closes: AtomicU64,
    arms: AtomicU64,
    replaced: AtomicU64,
    fires: AtomicU64,
    cancels: AtomicU64,
    deliveries: AtomicU64,
    discarded: AtomicU64,
    truncated_writes: AtomicU64,
}

/// Point-in-time copy of [`DeviceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub opens: u64,
    pub closes: u64,
    pub arms: u64,
    pub replaced: u64,
    pub fires: u64,
    pub cancels: u64,
    pub deliveries: u64,
    /// Completions dropped unread by a later arm or by close
    pub discarded: u64,
    pub truncated_writes: u64,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_opens(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_closes(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_arms(&self) {
        self.arms.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_replaced(&self) {
        self.replaced.fetch_add(1, Ordering::Relaxed);
    }

    /// Called from the timer callback context
    #[inline(always)]
    pub fn inc_fires(&self) {
        self.fires.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_cancels(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_deliveries(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_truncated_writes(&self) {
        self.truncated_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opens: self.opens.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            arms: self.arms.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            fires: self.fires.load(Ordering::Relaxed),
            cancels: self.cancels.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            truncated_writes: self.truncated_writes.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Completions that fired and still wait for a reader
    pub fn undelivered(&self) -> u64 {
        self.fires
            .saturating_sub(self.deliveries)
            .saturating_sub(self.discarded)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = DeviceStats::new();
        stats.inc_opens();
        stats.inc_arms();
        stats.inc_arms();
        stats.inc_fires();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.opens, 1);
        assert_eq!(snapshot.arms, 2);
        assert_eq!(snapshot.fires, 1);
        assert_eq!(snapshot.undelivered(), 1);

        stats.inc_discarded();
        assert_eq!(stats.snapshot().undelivered(), 0);
    }

    #[test]
    fn test_snapshot_json() {
        let stats = DeviceStats::new();
        stats.inc_deliveries();
        let json = stats.snapshot().to_json().unwrap();
        assert!(json.contains("\"deliveries\":1"));
    }
}
