use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Default host the server binds to and the client connects to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for the bridge.
pub const DEFAULT_TCP_PORT: u16 = 9779;

/// Default inactivity timeout applied to each socket read, in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// Default timeout for one outbound client call, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default namespace prefix under which controllers are registered.
pub const DEFAULT_CONTROLLERS_PREFIX: &str = "controllers";

/// Upper bound on the bytes accumulated for a single frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// `tracing` filter directive the server starts with.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default socket endpoint shared by server and client.
pub fn default_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_TCP_PORT)
}
