/*!
 * Timer Device
 *
 * A single-client "arm a one-shot timer, then block until it fires"
 * rendezvous exposed as a device-like resource.
 *
 * # Architecture
 *
 * ```text
 * control(SET_TIMER, d) ─► TimerScheduler::arm ──(worker thread)──► callback
 *                                                                     │
 * read() ◄── MessageStore::get ◄── RendezvousChannel::wait ◄── signal ┘
 * ```
 *
 * All shared state lives in an explicitly owned [`DeviceContext`] that is
 * injected into every [`DeviceSession`]. The timer callback only captures
 * the completion channel and the stats counters, never the context itself.
 */

mod control;
mod message;
mod scheduler;
mod session;
mod stats;

pub use control::ControlCommand;
pub use message::{Message, MessageStore};
pub use scheduler::{ArmedTimer, CancelOutcome, TickRate, TimerCallback, TimerScheduler};
pub use session::{DeviceSession, SessionState};
pub use stats::{DeviceStats, StatsSnapshot};

use crate::core::config::DeviceConfig;
use crate::core::errors::{DeviceError, DeviceResult};
use crate::core::sync::RendezvousChannel;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every session of one device
pub struct DeviceContext {
    config: DeviceConfig,
    messages: MessageStore,
    completion: Arc<RendezvousChannel>,
    scheduler: TimerScheduler,
    stats: Arc<DeviceStats>,
    session_open: AtomicBool,
    shut_down: AtomicBool,
    next_session: AtomicU64,
}

impl DeviceContext {
    fn new(config: DeviceConfig) -> DeviceResult<Self> {
        let completion = Arc::new(RendezvousChannel::new());
        let stats = Arc::new(DeviceStats::new());

        let scheduler = {
            let completion = completion.clone();
            let stats = stats.clone();
            TimerScheduler::new(&config, move |timer_id| {
                stats.inc_fires();
                let wake = completion.signal_tagged(timer_id);
                info!(
                    timer_id,
                    reader_woken = wake.is_woken(),
                    "Timer expired, waking read()"
                );
            })?
        };

        Ok(Self {
            config,
            messages: MessageStore::new(),
            completion,
            scheduler,
            stats,
            session_open: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            next_session: AtomicU64::new(1),
        })
    }

    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    #[inline]
    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Completion channel; only the timer callback signals it and only
    /// sessions consume it
    #[inline]
    pub(crate) fn completion(&self) -> &RendezvousChannel {
        &self.completion
    }

    #[inline]
    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Called by a session once its teardown is confirmed
    pub(crate) fn release_session(&self) {
        self.session_open.store(false, Ordering::SeqCst);
    }
}

/// Handle to a timer device
///
/// Cloning shares the same device. At most one session is open at a time.
///
/// # Example
///
/// ```no_run
/// use timer_device::{ControlCommand, DeviceConfig, TimerDevice};
///
/// let device = TimerDevice::new(DeviceConfig::default())?;
/// let mut session = device.open()?;
/// session.write(b"Done!")?;
/// session.control(ControlCommand::SetTimer { duration_ms: 50 })?;
/// let reply = session.read()?;
/// assert_eq!(reply.as_bytes(), b"Done!");
/// session.close()?;
/// # Ok::<(), timer_device::DeviceError>(())
/// ```
#[derive(Clone)]
pub struct TimerDevice {
    context: Arc<DeviceContext>,
}

impl TimerDevice {
    /// Create a device and start its timer worker
    pub fn new(config: DeviceConfig) -> DeviceResult<Self> {
        let context = Arc::new(DeviceContext::new(config)?);
        info!("Timer device loaded");
        Ok(Self { context })
    }

    pub fn with_defaults() -> DeviceResult<Self> {
        Self::new(DeviceConfig::default())
    }

    /// Create a device configured from `TIMER_*` environment variables
    pub fn from_env() -> DeviceResult<Self> {
        Self::new(DeviceConfig::from_env())
    }

    /// Open the single session; resets the message to the default
    pub fn open(&self) -> DeviceResult<DeviceSession> {
        let ctx = &self.context;

        if ctx
            .session_open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeviceError::DeviceBusy);
        }

        if ctx.shut_down.load(Ordering::SeqCst) {
            ctx.release_session();
            return Err(DeviceError::DeviceShutdown);
        }

        ctx.messages.reset();
        ctx.stats.inc_opens();

        let id = ctx.next_session.fetch_add(1, Ordering::Relaxed);
        Ok(DeviceSession::new(id, ctx.clone()))
    }

    /// Whether a session is currently open
    pub fn is_open(&self) -> bool {
        self.context.session_open.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.context.stats.snapshot()
    }

    /// Whether the current timer fired and its completion awaits a read
    pub fn has_pending_completion(&self) -> bool {
        self.context.completion.is_signalled()
    }

    #[inline]
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    /// Unload the device: cancel and join any pending timer, refuse new opens
    ///
    /// Fails with `DeviceBusy` while a session is open. If the pending timer
    /// cannot be confirmed inactive the device stays loaded and the error is
    /// returned.
    pub fn shutdown(&self) -> DeviceResult<()> {
        let ctx = &self.context;

        ctx.shut_down.store(true, Ordering::SeqCst);
        if ctx.session_open.load(Ordering::SeqCst) {
            ctx.shut_down.store(false, Ordering::SeqCst);
            return Err(DeviceError::DeviceBusy);
        }

        match ctx.scheduler.cancel() {
            Ok(outcome) => {
                debug!(?outcome, "Pending timer cleared for shutdown");
                info!("Timer device unloaded");
                Ok(())
            }
            Err(e) => {
                ctx.shut_down.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.context.shut_down.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TimerDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerDevice")
            .field("config", &self.context.config)
            .field("open", &self.is_open())
            .field("scheduler", &self.context.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_session_at_a_time() {
        let device = TimerDevice::with_defaults().unwrap();
        let session = device.open().unwrap();

        assert!(device.is_open());
        assert_eq!(device.open().unwrap_err(), DeviceError::DeviceBusy);

        session.close().unwrap();
        assert!(!device.is_open());
        assert!(device.open().is_ok());
    }

    #[test]
    fn test_shutdown_refused_while_open() {
        let device = TimerDevice::with_defaults().unwrap();
        let session = device.open().unwrap();

        assert_eq!(device.shutdown(), Err(DeviceError::DeviceBusy));
        assert!(!device.is_shut_down());

        session.close().unwrap();
        device.shutdown().unwrap();
        assert!(device.is_shut_down());
        assert_eq!(device.open().unwrap_err(), DeviceError::DeviceShutdown);
        assert!(!device.is_open());
    }

    #[test]
    fn test_open_counts_in_stats() {
        let device = TimerDevice::with_defaults().unwrap();
        device.open().unwrap().close().unwrap();
        device.open().unwrap().close().unwrap();

        let stats = device.stats();
        assert_eq!(stats.opens, 2);
        assert_eq!(stats.closes, 2);
    }
}
