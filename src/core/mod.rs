/*!
 * Core Module
 * Error handling, limits and serialization shared by every layer
 */

pub mod errors;
pub mod limits;
pub mod serialization;

// Re-export for convenience
pub use errors::{ExecError, ExecResult};
pub use serialization::{CodecError, CodecResult};
