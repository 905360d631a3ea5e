//! Shared configuration for the mpbridge server and client.
//!
//! The bridge core never reads configuration files on its own: embedding
//! applications (and the bundled binaries) build a [`Config`] from whatever
//! source suits them and hand it to the server or client. The type is
//! `serde`-deserialisable so callers can still load it from a file.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CONTROLLERS_PREFIX, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_READ_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TCP_PORT, default_log_format,
    default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError, LogSettings};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Runtime configuration shared by the bridge binaries.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Endpoint the server binds to, or the client connects to.
    pub listen: SocketEndpoint,
    /// Inactivity timeout for each socket read, in seconds.
    pub read_timeout_secs: u64,
    /// Timeout for a whole outbound call, in seconds.
    pub request_timeout_secs: u64,
    /// Namespace prefix combined with controller lookup keys.
    pub controllers_prefix: String,
    /// Maximum number of bytes buffered while waiting for a frame.
    pub max_frame_bytes: usize,
    /// Log filter and output format.
    pub logging: LogSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_socket_endpoint(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            controllers_prefix: DEFAULT_CONTROLLERS_PREFIX.to_owned(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            logging: LogSettings::default(),
        }
    }
}

impl Config {
    /// Returns the configured socket endpoint.
    #[must_use]
    pub fn listen(&self) -> &SocketEndpoint {
        &self.listen
    }

    /// Returns the per-read inactivity timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Returns the per-call request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the controller namespace prefix.
    #[must_use]
    pub fn controllers_prefix(&self) -> &str {
        &self.controllers_prefix
    }

    /// Returns the frame size limit in bytes.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Returns the log settings.
    #[must_use]
    pub fn logging(&self) -> &LogSettings {
        &self.logging
    }

    /// Returns the log filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.logging.filter
    }

    /// Returns the log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.logging.format
    }

    /// Replaces the socket endpoint.
    #[must_use]
    pub fn with_listen(mut self, listen: SocketEndpoint) -> Self {
        self.listen = listen;
        self
    }

    /// Replaces the per-read timeout.
    #[must_use]
    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    /// Replaces the per-call timeout.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Replaces the controller namespace prefix.
    #[must_use]
    pub fn with_controllers_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.controllers_prefix = prefix.into();
        self
    }

    /// Replaces the frame size limit.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Replaces the log filter and format.
    #[must_use]
    pub fn with_logging(mut self, filter: impl Into<String>, format: LogFormat) -> Self {
        self.logging = LogSettings::new(filter, format);
        self
    }
}
