/*!
 * Device Limits and Constants
 *
 * Centralized location for the timer device's fixed sizes, defaults and
 * magic numbers. Grouped by domain.
 *
 * - Linux-compatible values are marked with [LINUX-COMPAT]
 */

// =============================================================================
// MESSAGE LIMITS
// =============================================================================

/// Reply buffer capacity in bytes, terminator included
/// Messages hold at most `MESSAGE_CAPACITY - 1` payload bytes
pub const MESSAGE_CAPACITY: usize = 256;

/// Message every session starts from
pub const DEFAULT_MESSAGE: &[u8] = b"Timer Expired!\n";

/// Terminator written after the payload inside the buffer
pub const MESSAGE_TERMINATOR: u8 = 0;

// =============================================================================
// CONTROL INTERFACE
// =============================================================================

/// Control opcode that arms the one-shot timer
/// [LINUX-COMPAT] Same number the reference ioctl uses
pub const CMD_SET_TIMER: u32 = 1;

// =============================================================================
// TIMER LIMITS
// =============================================================================

/// Default scheduler tick rate (1ms resolution)
pub const DEFAULT_TICK_HZ: u32 = 1000;

/// Coarse tick rate matching a common kernel CONFIG_HZ
/// [LINUX-COMPAT]
pub const COARSE_TICK_HZ: u32 = 250;

/// Worker threads backing the deferred-callback runtime
/// One is enough: callbacks only flip a flag and notify
pub const DEFAULT_TIMER_WORKERS: usize = 1;

/// Thread name for timer workers (shows up in traces)
pub const DEFAULT_TIMER_THREAD_NAME: &str = "timer-worker";

// =============================================================================
// ENVIRONMENT
// =============================================================================

pub const ENV_TICK_HZ: &str = "TIMER_TICK_HZ";
pub const ENV_REARM_POLICY: &str = "TIMER_REARM_POLICY";
pub const ENV_WORKER_THREADS: &str = "TIMER_WORKER_THREADS";
pub const ENV_TRACE_JSON: &str = "TIMER_TRACE_JSON";

// =============================================================================
// ERRNO VALUES
// =============================================================================

/// [LINUX-COMPAT] errno values returned by a character device
pub mod errno {
    pub const EIO: i32 = 5;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOTTY: i32 = 25;
    pub const ETIMEDOUT: i32 = 110;
}
