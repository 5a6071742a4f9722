/*!
 * Monitoring
 * Structured tracing setup for binaries embedding the timer device
 */

mod tracer;

pub use tracer::{init_tracing, trace_json_enabled};
