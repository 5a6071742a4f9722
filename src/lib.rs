/*!
 * Timer Device Library
 *
 * A single-client one-shot timer rendezvous exposed as a device-like
 * resource: arm a timer with `control(SET_TIMER)`, optionally `write()` a
 * message, then block in `read()` until the deferred callback fires and
 * hands the message over exactly once.
 */

pub mod core;
pub mod device;
pub mod duration;
pub mod monitoring;

// Re-exports
pub use crate::core::limits::{CMD_SET_TIMER, DEFAULT_MESSAGE, MESSAGE_CAPACITY};
pub use crate::core::{
    DeviceConfig, DeviceError, DeviceResult, ParsePolicyError, RearmPolicy, RendezvousChannel,
};
pub use device::{
    ArmedTimer, CancelOutcome, ControlCommand, DeviceSession, Message, MessageStore,
    SessionState, StatsSnapshot, TimerDevice, TimerScheduler,
};
pub use duration::{parse_duration, DurationParseError};
pub use monitoring::init_tracing;
