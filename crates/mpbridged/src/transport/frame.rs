//! Incremental frame reading with a per-read inactivity timeout.
//!
//! The peer never signals the end of a message; a frame is complete as soon
//! as the accumulated bytes decode to one msgpack value. Reading is an
//! explicit state machine:
//!
//! ```text
//! Accumulating --(value decodes)----------> Decoded
//!      |  ^
//!      |  +--(bytes still incomplete)
//!      +------(read timed out)-------------> TimedOut
//!      +------(eof, invalid data, i/o)-----> ProtocolError
//! ```
//!
//! The timeout is armed once with `set_read_timeout`, so each read restarts
//! it: a slow trickle succeeds as long as every byte arrives in time.

use std::io::{self, Read};
use std::time::Duration;

use mpbridge_proto::{DecodeOutcome, Value, try_decode};

use super::{FrameError, ReadTimeout};

/// Bytes requested from the socket per read.
pub const READ_CHUNK_BYTES: usize = 4096;

enum FrameState {
    Accumulating,
    Decoded(Value),
    TimedOut,
    ProtocolError(FrameError),
}

/// Reads exactly one msgpack frame from a stream.
#[derive(Debug, Clone, Copy)]
pub struct FrameReader {
    timeout: Duration,
    max_frame_bytes: usize,
}

impl FrameReader {
    /// Creates a reader; a zero `timeout` disables the inactivity bound.
    pub fn new(timeout: Duration, max_frame_bytes: usize) -> Self {
        Self {
            timeout,
            max_frame_bytes,
        }
    }

    /// Inactivity timeout applied to each read.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reads until one frame decodes. Bytes following the frame are discarded.
    pub fn read_frame<S>(&self, stream: &mut S) -> Result<Value, FrameError>
    where
        S: Read + ReadTimeout,
    {
        let timeout = (!self.timeout.is_zero()).then_some(self.timeout);
        stream.set_read_timeout(timeout)?;

        let mut buffer = Vec::new();
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        let mut state = FrameState::Accumulating;
        loop {
            state = match state {
                FrameState::Accumulating => self.advance(stream, &mut buffer, &mut chunk),
                FrameState::Decoded(value) => return Ok(value),
                FrameState::TimedOut => {
                    return Err(FrameError::TimedOut {
                        timeout: self.timeout,
                    });
                }
                FrameState::ProtocolError(error) => return Err(error),
            };
        }
    }

    fn advance<S: Read>(&self, stream: &mut S, buffer: &mut Vec<u8>, chunk: &mut [u8]) -> FrameState {
        let read = match read_with_retry(stream, chunk) {
            Ok(0) => {
                return FrameState::ProtocolError(FrameError::Closed {
                    buffered: buffer.len(),
                });
            }
            Ok(read) => read,
            Err(error) if is_timeout(&error) => return FrameState::TimedOut,
            Err(error) => return FrameState::ProtocolError(FrameError::Io(error)),
        };
        buffer.extend_from_slice(chunk.get(..read).unwrap_or(chunk));

        match try_decode(buffer) {
            DecodeOutcome::Complete { value, .. } => FrameState::Decoded(value),
            DecodeOutcome::Incomplete if buffer.len() > self.max_frame_bytes => {
                FrameState::ProtocolError(FrameError::TooLarge {
                    limit: self.max_frame_bytes,
                })
            }
            DecodeOutcome::Incomplete => FrameState::Accumulating,
            DecodeOutcome::Invalid(error) => FrameState::ProtocolError(FrameError::Invalid(error)),
        }
    }
}

/// Reads from the stream, retrying on interrupts.
fn read_with_retry<S: Read>(stream: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

// Unix platforms report an expired read timeout as `WouldBlock`.
fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
