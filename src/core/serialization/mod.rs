/*!
 * Serialization Utilities
 *
 * Bincode codec and length-prefixed framing for the worker channel.
 */

pub mod bincode;

pub use self::bincode::{decode, encode, read_frame, write_frame, CodecError, CodecResult};
