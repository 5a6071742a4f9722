/*!
 * Control Commands
 * Typed decoding of ioctl-style `(opcode, argument)` pairs
 */

use crate::core::errors::{DeviceError, DeviceResult};
use crate::core::limits::CMD_SET_TIMER;

/// Control command understood by the timer device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Arm the one-shot timer
    SetTimer { duration_ms: i64 },
}

impl ControlCommand {
    /// Decode a raw control call; unknown opcodes are rejected
    pub fn decode(opcode: u32, arg: i64) -> DeviceResult<Self> {
        match opcode {
            CMD_SET_TIMER => Ok(ControlCommand::SetTimer { duration_ms: arg }),
            other => Err(DeviceError::InvalidControlOpcode(other)),
        }
    }

    #[inline]
    pub fn opcode(&self) -> u32 {
        match self {
            ControlCommand::SetTimer { .. } => CMD_SET_TIMER,
        }
    }
}

impl TryFrom<(u32, i64)> for ControlCommand {
    type Error = DeviceError;

    fn try_from((opcode, arg): (u32, i64)) -> Result<Self, Self::Error> {
        Self::decode(opcode, arg)
    }
}
