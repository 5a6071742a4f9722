/*!
 * Synchronization Primitives
 *
 * Completion handoff between an asynchronous producer (a timer callback
 * running on a worker thread) and a synchronous blocking consumer.
 *
 * # Use Cases
 *
 * - **Timer completions**: Block a reader until a deferred callback fires
 * - **Task latches**: Confirm a cancelled task has been dropped
 */

mod rendezvous;

pub use rendezvous::{RendezvousChannel, WaitError, WaitResult, WakeResult};
