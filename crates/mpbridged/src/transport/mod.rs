//! Socket transport for the bridge server.
//!
//! The listener binds a TCP or Unix endpoint and hands every accepted
//! connection to a [`ConnectionHandler`] on its own thread. [`FrameReader`]
//! pulls exactly one msgpack frame from such a connection.

mod errors;
mod frame;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::{FrameError, ListenerError};
pub use self::frame::{FrameReader, READ_CHUNK_BYTES};
pub use self::handler::{ConnectionHandler, ConnectionStream, ReadTimeout};
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, ScriptedStream};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
