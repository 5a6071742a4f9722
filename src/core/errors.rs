/*!
 * Error Types
 * Centralized device error handling with thiserror and miette
 */

use super::limits::errno;
use super::sync::WaitError;
use miette::Diagnostic;
use thiserror::Error;

/// Result alias used across the device
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Timer device errors
///
/// Every variant maps onto the errno a character device would hand back,
/// see [`DeviceError::errno`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[non_exhaustive]
pub enum DeviceError {
    #[error("Unsupported control opcode: {0}")]
    #[diagnostic(
        code(device::invalid_control_opcode),
        help("Only CMD_SET_TIMER (1) is understood by the timer device.")
    )]
    InvalidControlOpcode(u32),

    #[error("Boundary copy failed: message needs {needed} bytes, destination holds {available}")]
    #[diagnostic(
        code(device::boundary_copy_failure),
        help("Pass a buffer of at least MESSAGE_CAPACITY bytes. The completion is still pending.")
    )]
    BoundaryCopyFailure { needed: usize, available: usize },

    #[error("A timer is already pending ({remaining_ms} ms remaining)")]
    #[diagnostic(
        code(device::timer_already_pending),
        help("Read the pending completion first, or configure RearmPolicy::Replace.")
    )]
    TimerAlreadyPending { remaining_ms: u64 },

    #[error("Invalid timer duration: {0} ms")]
    #[diagnostic(
        code(device::invalid_duration),
        help("Durations must be zero or positive milliseconds.")
    )]
    InvalidDuration(i64),

    #[error("Device is busy: another session is open")]
    #[diagnostic(
        code(device::busy),
        help("The timer device serves a single client. Close the other session first.")
    )]
    DeviceBusy,

    #[error("Device has been shut down")]
    #[diagnostic(code(device::shutdown))]
    DeviceShutdown,

    #[error("Another reader is already waiting for the completion")]
    #[diagnostic(
        code(device::concurrent_reader),
        help("Only one thread may block in read() per timer cycle.")
    )]
    ConcurrentReader,

    #[error("Read timed out after {timeout_ms} ms")]
    #[diagnostic(code(device::read_timed_out))]
    ReadTimedOut { timeout_ms: u64 },

    #[error("Timer runtime error: {0}")]
    #[diagnostic(
        code(device::runtime),
        help("The deferred-callback runtime could not be started. Check thread limits.")
    )]
    Runtime(String),
}

impl DeviceError {
    /// errno equivalent of this error (positive value)
    pub fn errno(&self) -> i32 {
        match self {
            DeviceError::InvalidControlOpcode(_) => errno::ENOTTY,
            DeviceError::BoundaryCopyFailure { .. } => errno::EFAULT,
            DeviceError::TimerAlreadyPending { .. } => errno::EBUSY,
            DeviceError::InvalidDuration(_) => errno::EINVAL,
            DeviceError::DeviceBusy => errno::EBUSY,
            DeviceError::DeviceShutdown => errno::ENODEV,
            DeviceError::ConcurrentReader => errno::EBUSY,
            DeviceError::ReadTimedOut { .. } => errno::ETIMEDOUT,
            DeviceError::Runtime(_) => errno::EIO,
        }
    }
}

impl From<WaitError> for DeviceError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout(timeout) => DeviceError::ReadTimedOut {
                timeout_ms: timeout.as_millis() as u64,
            },
            WaitError::ConcurrentWaiter => DeviceError::ConcurrentReader,
        }
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::Runtime(err.to_string())
    }
}
