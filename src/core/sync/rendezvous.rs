/*!
 * Rendezvous Channel
 *
 * A persisted completion flag guarded by a `parking_lot` mutex, paired with
 * a condvar for the blocked consumer.
 *
 * # Design: Flag Plus Condition
 *
 * A bare notify loses a wakeup when the producer fires before the consumer
 * starts waiting. Here `signal()` sets the flag under the lock and the
 * consumer re-checks the flag under the same lock before parking, so the
 * completion persists until a consumer takes it:
 *
 * ```text
 * signal()                        wait_and_consume()
 *   lock                            lock
 *   completed = true                while !completed { park }
 *   notify_one                      completed = false
 *   unlock                          unlock
 * ```
 *
 * Exactly one consumer may wait per cycle. A second concurrent waiter is
 * refused with [`WaitError::ConcurrentWaiter`].
 *
 * # Tagged Completions
 *
 * A completion carries the tag of the producer that raised it, and the
 * consumer only accepts the tag it currently expects. After
 * [`expect_tag`](RendezvousChannel::expect_tag) a completion left behind by
 * an older producer is invisible, so a new cycle never returns early on a
 * stale signal. Tags must increase: an older tag never displaces a newer
 * pending completion. Plain `signal()` uses the current tag.
 */

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Result type for wait operations
pub type WaitResult<T> = Result<T, WaitError>;

/// Wait operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("Wait operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Another thread is already waiting on this channel")]
    ConcurrentWaiter,
}

/// Result of a signal operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    /// A parked consumer was woken
    Woken(usize),
    /// Nobody was waiting; the completion stays pending
    NoWaiters,
    /// The tag is older than the pending completion and was dropped
    Stale,
}

impl WakeResult {
    #[inline(always)]
    pub fn is_woken(&self) -> bool {
        matches!(self, WakeResult::Woken(_))
    }
}

#[derive(Debug)]
struct ChannelState {
    /// Tag of the unconsumed completion, if any
    completed: Option<u64>,
    /// Tag the consumer accepts
    expected: u64,
    /// A consumer is parked (or about to park) on the condvar
    waiting: bool,
}

impl ChannelState {
    #[inline]
    fn is_ready(&self) -> bool {
        self.completed == Some(self.expected)
    }
}

/// Completion flag plus wait/notify
#[derive(Debug)]
pub struct RendezvousChannel {
    state: Mutex<ChannelState>,
    condvar: Condvar,
}

impl RendezvousChannel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                completed: None,
                expected: 0,
                waiting: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Mark a completion pending under the current tag and wake the waiter
    pub fn signal(&self) -> WakeResult {
        let mut state = self.state.lock();
        let tag = state.expected;
        self.raise(&mut state, tag)
    }

    /// Mark a completion pending under `tag` and wake the waiter
    ///
    /// The waiter only returns if `tag` is the expected one, now or after a
    /// later [`expect_tag`](Self::expect_tag).
    pub fn signal_tagged(&self, tag: u64) -> WakeResult {
        let mut state = self.state.lock();
        self.raise(&mut state, tag)
    }

    fn raise(&self, state: &mut ChannelState, tag: u64) -> WakeResult {
        if state.completed.is_some_and(|pending| pending > tag) {
            return WakeResult::Stale;
        }

        state.completed = Some(tag);
        if state.waiting {
            self.condvar.notify_one();
            WakeResult::Woken(1)
        } else {
            WakeResult::NoWaiters
        }
    }

    /// Accept only completions raised under `tag` from now on
    ///
    /// Returns true when an unconsumed completion with another tag was
    /// superseded.
    pub fn expect_tag(&self, tag: u64) -> bool {
        let mut state = self.state.lock();
        state.expected = tag;
        state.completed.is_some_and(|pending| pending != tag)
    }

    /// Whether a completion the consumer accepts is pending (does not consume it)
    #[inline]
    pub fn is_signalled(&self) -> bool {
        self.state.lock().is_ready()
    }

    /// Whether a consumer is currently blocked
    #[inline]
    pub fn has_waiter(&self) -> bool {
        self.state.lock().waiting
    }

    /// Drop any unconsumed completion without delivering it
    ///
    /// Only valid once no producer can signal this cycle any more.
    pub(crate) fn discard(&self) -> bool {
        let mut state = self.state.lock();
        let ready = state.is_ready();
        state.completed = None;
        ready
    }

    /// Block until a completion is pending, then clear it
    pub fn wait_and_consume(&self) -> WaitResult<()> {
        self.consume_with(None, || Ok::<(), WaitError>(()))
    }

    /// Like [`wait_and_consume`](Self::wait_and_consume) but gives up after `timeout`
    ///
    /// A timeout never consumes: a completion that arrives later is still
    /// observed by the next wait.
    pub fn wait_and_consume_timeout(&self, timeout: Duration) -> WaitResult<()> {
        self.consume_with(Some(timeout), || Ok::<(), WaitError>(()))
    }

    /// Block until a completion is pending, then run `deliver` while the
    /// channel lock is held
    ///
    /// The flag is cleared only when `deliver` succeeds; on error the
    /// completion stays pending for the next attempt. `deliver` must not
    /// call back into this channel.
    pub fn consume_with<T, E, F>(&self, timeout: Option<Duration>, deliver: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<WaitError>,
    {
        let mut state = self.state.lock();
        if state.waiting {
            return Err(WaitError::ConcurrentWaiter.into());
        }
        state.waiting = true;

        // A deadline too far out to represent is the same as no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        while !state.is_ready() {
            match deadline {
                None => self.condvar.wait(&mut state),
                Some(deadline) => {
                    let timed_out = self.condvar.wait_until(&mut state, deadline).timed_out();
                    if timed_out && !state.is_ready() {
                        state.waiting = false;
                        return Err(WaitError::Timeout(timeout.unwrap_or_default()).into());
                    }
                }
            }
        }

        state.waiting = false;
        let delivered = deliver()?;
        state.completed = None;
        Ok(delivered)
    }
}

impl Default for RendezvousChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_signal_before_wait_is_not_lost() {
        let channel = RendezvousChannel::new();

        assert_eq!(channel.signal(), WakeResult::NoWaiters);
        assert!(channel.is_signalled());

        // Must return immediately: the flag persisted
        let start = Instant::now();
        channel.wait_and_consume().unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!channel.is_signalled());
    }

    #[test]
    fn test_wait_then_signal_from_thread() {
        let channel = Arc::new(RendezvousChannel::new());
        let waiter = channel.clone();

        let handle = thread::spawn(move || waiter.wait_and_consume_timeout(Duration::from_secs(2)));

        // Give thread time to park
        while !channel.has_waiter() {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(channel.signal().is_woken());
        assert!(handle.join().unwrap().is_ok());
        assert!(!channel.is_signalled());
    }

    #[test]
    fn test_timeout_does_not_consume() {
        let channel = RendezvousChannel::new();

        let result = channel.wait_and_consume_timeout(Duration::from_millis(30));
        assert_eq!(result, Err(WaitError::Timeout(Duration::from_millis(30))));
        assert!(!channel.has_waiter());

        channel.signal();
        assert!(channel.wait_and_consume_timeout(Duration::from_millis(30)).is_ok());
    }

    #[test]
    fn test_consumed_completion_blocks_next_cycle() {
        let channel = RendezvousChannel::new();
        channel.signal();
        channel.wait_and_consume().unwrap();

        let result = channel.wait_and_consume_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(WaitError::Timeout(_))));
    }

    #[test]
    fn test_failed_delivery_keeps_completion() {
        let channel = RendezvousChannel::new();
        channel.signal();

        let result: Result<(), WaitError> =
            channel.consume_with(None, || Err(WaitError::ConcurrentWaiter));
        assert!(result.is_err());
        assert!(channel.is_signalled());

        assert!(channel.discard());
        assert!(!channel.discard());
    }

    #[test]
    fn test_second_waiter_is_refused() {
        let channel = Arc::new(RendezvousChannel::new());
        let waiter = channel.clone();

        let handle = thread::spawn(move || waiter.wait_and_consume_timeout(Duration::from_secs(2)));
        while !channel.has_waiter() {
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(
            channel.wait_and_consume_timeout(Duration::from_millis(10)),
            Err(WaitError::ConcurrentWaiter)
        );

        channel.signal();
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_superseded_completion_is_invisible() {
        let channel = RendezvousChannel::new();
        channel.expect_tag(1);
        channel.signal_tagged(1);
        assert!(channel.is_signalled());

        // Nobody read tag 1; the next cycle expects tag 2
        assert!(channel.expect_tag(2));
        assert!(!channel.is_signalled());
        assert!(matches!(
            channel.wait_and_consume_timeout(Duration::from_millis(20)),
            Err(WaitError::Timeout(_))
        ));

        channel.signal_tagged(2);
        channel.wait_and_consume().unwrap();
        assert!(!channel.is_signalled());
    }

    #[test]
    fn test_signal_ahead_of_expect_tag_is_kept() {
        let channel = RendezvousChannel::new();
        channel.expect_tag(1);
        channel.signal_tagged(1);

        // Tag 2 fires before the consumer switches over to it
        channel.signal_tagged(2);
        assert!(!channel.expect_tag(2));
        assert!(channel.is_signalled());

        // An older tag never displaces the newer completion
        assert_eq!(channel.signal_tagged(1), WakeResult::Stale);
        channel.wait_and_consume().unwrap();
    }
}
