//! Errors raised by the transport layer.

use std::io;
use std::time::Duration;

use mpbridge_config::SocketEndpoint;
use thiserror::Error;

/// Failures while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host name resolution failed.
    #[error("cannot resolve {endpoint}: {source}")]
    Resolve {
        endpoint: SocketEndpoint,
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded without yielding an address to bind.
    #[error("{endpoint} resolved to no addresses")]
    NoAddress { endpoint: SocketEndpoint },
    /// The operating system refused the bind.
    #[error("cannot bind {endpoint}: {source}")]
    Bind {
        endpoint: SocketEndpoint,
        #[source]
        source: io::Error,
    },
    /// The accept socket could not be switched to polling mode.
    #[error("cannot poll {endpoint} for connections: {source}")]
    NonBlocking {
        endpoint: SocketEndpoint,
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("{endpoint} needs Unix domain sockets, which this platform lacks")]
    UnsupportedUnix { endpoint: SocketEndpoint },
    /// Another server still answers on the socket path.
    #[cfg(unix)]
    #[error("another server is listening on {path}")]
    SocketInUse { path: String },
    /// The socket path is taken by something other than a socket.
    #[cfg(unix)]
    #[error("{path} exists and is not a socket")]
    NotASocket { path: String },
    /// A leftover socket file could not be inspected, probed or removed.
    #[cfg(unix)]
    #[error("cannot {step} leftover socket {path}: {source}")]
    StaleSocket {
        path: String,
        step: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Failures that abort reading a request frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// No bytes arrived within the inactivity timeout.
    #[error("no data received within {timeout:?}")]
    TimedOut { timeout: Duration },
    /// The peer sent end-of-stream before a complete frame.
    #[error("connection closed after {buffered} bytes without a complete frame")]
    Closed { buffered: usize },
    /// The buffered bytes exceed the configured frame limit.
    #[error("frame exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    /// The buffered bytes can never decode.
    #[error("invalid msgpack frame: {0}")]
    Invalid(#[source] rmpv::decode::Error),
    /// Reading or configuring the socket failed.
    #[error("socket read failed: {0}")]
    Io(#[from] io::Error),
}
