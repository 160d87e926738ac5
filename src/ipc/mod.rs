/*!
 * Inter-Process Communication
 * Result envelope and the one-shot channel that carries it
 */

pub mod channel;
pub mod envelope;

// Re-export public API
pub use channel::{send_frame, ChannelEvent, Received, ResultChannel, ResultReceiver};
pub use envelope::{Envelope, RemoteError, WorkerFailure, PANIC_KIND};
