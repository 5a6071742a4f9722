/*!
 * Device Session
 *
 * Per-open state machine over the shared [`DeviceContext`]:
 *
 * ```text
 * Closed ─open()─► Open ─control()─► Armed ─read() wakes─► Delivering ─► Open
 *                    ▲                                                    │
 *                    └────────────────────────────────────────────────────┘
 *                  close() from Open or Armed ─► Closed
 * ```
 *
 * Operations are only reachable on an open session: `open()` hands out the
 * session and `close()` consumes it. Dropping a session without `close()`
 * falls back to the same teardown and logs a warning.
 */

use super::control::ControlCommand;
use super::message::Message;
use super::scheduler::{ArmedTimer, CancelOutcome};
use super::DeviceContext;
use crate::core::errors::{DeviceError, DeviceResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, no timer pending
    Open,
    /// Open with a timer pending
    Armed,
    /// A woken read is copying the message out
    Delivering,
    /// Torn down
    Closed,
}

/// An open session on a timer device
pub struct DeviceSession {
    id: u64,
    trace_id: Uuid,
    context: Arc<DeviceContext>,
    state: SessionState,
    span: Span,
}

impl DeviceSession {
    pub(super) fn new(id: u64, context: Arc<DeviceContext>) -> Self {
        let trace_id = Uuid::new_v4();
        let span = info_span!("session", id, trace_id = %trace_id);
        span.in_scope(|| info!("Device opened, message reset to default"));

        Self {
            id,
            trace_id,
            context,
            state: SessionState::Open,
            span,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            SessionState::Open if self.context.scheduler().is_pending() => SessionState::Armed,
            state => state,
        }
    }

    /// Set the reply message; input beyond capacity is truncated silently
    ///
    /// Returns the number of bytes accepted.
    pub fn write(&mut self, bytes: &[u8]) -> DeviceResult<usize> {
        let _enter = self.span.enter();

        let accepted = self.context.messages().set(bytes);
        if accepted < bytes.len() {
            self.context.stats().inc_truncated_writes();
            debug!(
                offered = bytes.len(),
                accepted, "Custom message truncated to capacity"
            );
        }

        info!(
            message = %String::from_utf8_lossy(&bytes[..accepted]),
            "Custom message set"
        );
        Ok(accepted)
    }

    /// Run a typed control command
    pub fn control(&mut self, command: ControlCommand) -> DeviceResult<ArmedTimer> {
        let _enter = self.span.enter();

        match command {
            ControlCommand::SetTimer { duration_ms } => {
                let armed = self.context.scheduler().arm(duration_ms)?;
                let stats = self.context.stats();
                stats.inc_arms();
                if armed.replaced {
                    stats.inc_replaced();
                }

                // Only this timer's completion may satisfy the next read
                if self.context.completion().expect_tag(armed.id) {
                    stats.inc_discarded();
                    debug!("Dropped unread completion of an earlier timer");
                }

                info!(
                    duration_ms,
                    ticks = armed.ticks,
                    timer_id = armed.id,
                    "Setting timer"
                );
                Ok(armed)
            }
        }
    }

    /// Decode and run an ioctl-style control call
    pub fn control_raw(&mut self, opcode: u32, arg: i64) -> DeviceResult<ArmedTimer> {
        let command = ControlCommand::decode(opcode, arg).inspect_err(|e| {
            self.span
                .in_scope(|| warn!(opcode, error = %e, "Rejected control call"));
        })?;
        self.control(command)
    }

    /// Block until the timer fires, then return the current message
    ///
    /// With no timer armed this blocks until one is armed and fires.
    pub fn read(&mut self) -> DeviceResult<Message> {
        self.deliver(None, Ok)
    }

    /// Like [`read`](Self::read) but gives up after `timeout`
    ///
    /// A timed-out read leaves any later completion pending for the next read.
    pub fn read_timeout(&mut self, timeout: Duration) -> DeviceResult<Message> {
        self.deliver(Some(timeout), Ok)
    }

    /// Block until the timer fires, then copy the message into `buf`
    ///
    /// Fails with `BoundaryCopyFailure` when `buf` cannot hold the message;
    /// the completion is then left pending.
    pub fn read_into(&mut self, buf: &mut [u8]) -> DeviceResult<usize> {
        self.deliver(None, |message| {
            let needed = message.len();
            if buf.len() < needed {
                return Err(DeviceError::BoundaryCopyFailure {
                    needed,
                    available: buf.len(),
                });
            }
            buf[..needed].copy_from_slice(message.as_bytes());
            Ok(needed)
        })
    }

    fn deliver<T, F>(&mut self, timeout: Option<Duration>, copy_out: F) -> DeviceResult<T>
    where
        F: FnOnce(Message) -> DeviceResult<T>,
    {
        let _enter = self.span.enter();
        debug!(?timeout, "Read called, waiting for timer");

        let context = &self.context;
        let state = &mut self.state;

        context.completion().consume_with(timeout, || {
            *state = SessionState::Delivering;
            let message = context.messages().get();
            let delivered = copy_out(message);
            *state = SessionState::Open;

            if delivered.is_ok() {
                context.stats().inc_deliveries();
                debug!("Completion consumed, message delivered");
            }
            delivered
        })
    }

    /// Cancel any pending timer and release the session
    pub fn close(mut self) -> DeviceResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> DeviceResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let _enter = self.span.enter();
        let outcome = self.context.scheduler().cancel()?;
        if outcome == CancelOutcome::Cancelled {
            self.context.stats().inc_cancels();
        }
        // No timer can signal any more; an unread completion dies with the session
        if self.context.completion().discard() {
            self.context.stats().inc_discarded();
            debug!("Dropped unread completion on close");
        }

        self.state = SessionState::Closed;
        self.context.stats().inc_closes();
        self.context.release_session();
        info!(?outcome, "Device closed");
        Ok(())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        self.span
            .in_scope(|| warn!("Session dropped without close(), tearing down"));
        if let Err(e) = self.teardown() {
            self.span.in_scope(
                || warn!(error = %e, "Pending timer could not be confirmed cancelled"),
            );
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("trace_id", &self.trace_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::{CMD_SET_TIMER, DEFAULT_MESSAGE};
    use crate::device::TimerDevice;
    use std::time::Instant;

    #[test]
    fn test_state_follows_timer() {
        let device = TimerDevice::with_defaults().unwrap();
        let mut session = device.open().unwrap();
        assert_eq!(session.state(), SessionState::Open);

        session.control_raw(CMD_SET_TIMER, 30).unwrap();
        assert_eq!(session.state(), SessionState::Armed);

        session.read().unwrap();
        assert_eq!(session.state(), SessionState::Open);
        session.close().unwrap();
    }

    #[test]
    fn test_read_into_small_buffer_keeps_completion() {
        let device = TimerDevice::with_defaults().unwrap();
        let mut session = device.open().unwrap();
        session.control_raw(CMD_SET_TIMER, 1).unwrap();

        let mut tiny = [0u8; 4];
        let err = session.read_into(&mut tiny).unwrap_err();
        assert_eq!(
            err,
            DeviceError::BoundaryCopyFailure {
                needed: DEFAULT_MESSAGE.len(),
                available: 4
            }
        );

        // Completion was not consumed: the retry returns without re-arming
        let mut buf = [0u8; 256];
        let start = Instant::now();
        let n = session.read_into(&mut buf).unwrap();
        assert_eq!(&buf[..n], DEFAULT_MESSAGE);
        assert!(start.elapsed() < Duration::from_millis(500));
        session.close().unwrap();
    }

    #[test]
    fn test_invalid_opcode_leaves_timer_idle() {
        let device = TimerDevice::with_defaults().unwrap();
        let mut session = device.open().unwrap();

        let err = session.control_raw(99, 10).unwrap_err();
        assert_eq!(err, DeviceError::InvalidControlOpcode(99));
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(device.stats().arms, 0);
        session.close().unwrap();
    }

    #[test]
    fn test_read_timeout_without_arm() {
        let device = TimerDevice::with_defaults().unwrap();
        let mut session = device.open().unwrap();

        let err = session.read_timeout(Duration::from_millis(30)).unwrap_err();
        assert_eq!(err, DeviceError::ReadTimedOut { timeout_ms: 30 });
        session.close().unwrap();
    }

    #[test]
    fn test_rearm_after_unread_fire_waits_for_new_timer() {
        let device = TimerDevice::with_defaults().unwrap();
        let mut session = device.open().unwrap();

        session.control_raw(CMD_SET_TIMER, 1).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(device.has_pending_completion());

        let start = Instant::now();
        let armed = session.control_raw(CMD_SET_TIMER, 100).unwrap();
        assert!(!armed.replaced);
        assert!(!device.has_pending_completion());

        session.read().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(device.stats().discarded, 1);
        session.close().unwrap();
    }

    #[test]
    fn test_drop_without_close_releases_device() {
        let device = TimerDevice::with_defaults().unwrap();
        {
            let mut session = device.open().unwrap();
            session.control_raw(CMD_SET_TIMER, 5_000).unwrap();
        }

        assert!(!device.is_open());
        assert!(!device.context().scheduler().is_pending());
        assert_eq!(device.stats().cancels, 1);
    }
}
