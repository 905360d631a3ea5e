//! Incremental msgpack frame decoding.
//!
//! msgpack-rpc carries no length prefix and no terminator, so the only way to
//! know a frame is complete is to try decoding it. [`try_decode`] makes the
//! three possible answers explicit instead of leaving callers to inspect
//! decoder errors.

use std::io::{self, Write};

use rmpv::Value;
use rmpv::decode::{self, Error as DecodeError};
use thiserror::Error;

/// Deepest array/map nesting accepted in one frame.
///
/// Decoding recurses once per level, so the bound keeps hostile input from
/// exhausting a connection thread's stack.
pub const MAX_FRAME_DEPTH: usize = 128;

/// Result of attempting to decode one value from the front of a buffer.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A complete value was decoded.
    Complete {
        /// The decoded value.
        value: Value,
        /// Number of bytes the value occupied.
        consumed: usize,
    },
    /// The buffer ends before the value does; more bytes are needed.
    Incomplete,
    /// The bytes can never form a valid value.
    Invalid(DecodeError),
}

/// Attempts to decode a single msgpack value from the start of `buffer`.
///
/// Bytes after the first value are left untouched and reported through
/// `consumed`. Values nested deeper than [`MAX_FRAME_DEPTH`] are invalid.
pub fn try_decode(buffer: &[u8]) -> DecodeOutcome {
    let mut cursor = buffer;
    match decode::read_value_with_max_depth(&mut cursor, MAX_FRAME_DEPTH) {
        Ok(value) => DecodeOutcome::Complete {
            value,
            consumed: buffer.len() - cursor.len(),
        },
        Err(DecodeError::InvalidMarkerRead(error) | DecodeError::InvalidDataRead(error))
            if error.kind() == io::ErrorKind::UnexpectedEof =>
        {
            DecodeOutcome::Incomplete
        }
        Err(error) => DecodeOutcome::Invalid(error),
    }
}

/// Errors raised while encoding a value for the wire.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The msgpack encoder rejected the value or the writer failed.
    #[error("failed to encode msgpack value: {0}")]
    Encode(#[from] rmpv::encode::Error),
    /// Flushing the encoded frame failed.
    #[error("failed to write frame: {0}")]
    Io(#[from] io::Error),
}

/// Encodes `value` into a freshly allocated buffer.
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    rmpv::encode::write_value(&mut buffer, value)?;
    Ok(buffer)
}

/// Encodes `value` and writes it to `writer` as a single frame, then flushes.
pub fn write_frame<W: Write>(writer: &mut W, value: &Value) -> Result<(), EncodeError> {
    let bytes = encode(value)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
