/*!
 * Core Module
 * Shared infrastructure: errors, configuration, limits and synchronization
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod sync;

pub use config::{DeviceConfig, ParsePolicyError, RearmPolicy};
pub use errors::{DeviceError, DeviceResult};
pub use sync::{RendezvousChannel, WaitError, WaitResult, WakeResult};
