/*!
 * Binary Serialization with bincode
 * Envelope and job-request encoding plus length-prefixed framing
 */

use crate::core::limits::{FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, Read, Write};

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Binary serialization and framing errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Frame I/O error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize to binary bytes using bincode
#[inline]
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Deserialize from binary bytes using bincode
#[inline]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Deserialization(e.to_string()))
}

// ============================================================================
// Framing
// ============================================================================

/// Write one frame: [4-byte LE length][payload]
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> CodecResult<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: payload.len(),
            limit: MAX_FRAME_SIZE,
        });
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame
///
/// Returns `Ok(None)` when the stream is closed before any header byte
/// arrives. A stream closed part-way through a frame is `Truncated`.
pub fn read_frame<R: Read>(reader: &mut R) -> CodecResult<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let got = read_full(reader, &mut header)?;
    if got == 0 {
        return Ok(None);
    }
    if got < FRAME_HEADER_SIZE {
        return Err(CodecError::Truncated {
            expected: FRAME_HEADER_SIZE,
            actual: got,
        });
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload)?;
    if got < len {
        return Err(CodecError::Truncated {
            expected: len,
            actual: got,
        });
    }

    Ok(Some(payload))
}

/// Fill `buf` until it is full or the stream ends, returning bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
