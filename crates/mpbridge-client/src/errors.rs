//! Error types for the client call path.

use std::io;
use std::time::Duration;

use mpbridge_proto::{EncodeError, EnvelopeError, ErrorKind, NormalizeError};
use thiserror::Error;

/// Failures of a single call, before they are folded into a response.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to resolve server address {endpoint}: {source}")]
    Resolve { endpoint: String, source: io::Error },
    #[error("failed to connect to server at {endpoint}: {source}")]
    Connect { endpoint: String, source: io::Error },
    #[error("failed to configure connection to {endpoint}: {source}")]
    Configure { endpoint: String, source: io::Error },
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),
    #[error("failed to send request: {0}")]
    Send(#[source] EncodeError),
    #[error("failed to read answer: {0}")]
    Receive(#[source] io::Error),
    #[error("no answer within {timeout:?}")]
    TimedOut { timeout: Duration },
    #[error("server closed the connection after {received} bytes")]
    Closed { received: usize },
    #[error("answer exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("answer is not valid msgpack: {0}")]
    Decode(#[source] rmpv::decode::Error),
    #[error("malformed answer envelope: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("server sent a request instead of an answer")]
    UnexpectedRequest,
    #[error("answer id {found} does not match request id {expected}")]
    MismatchedId { expected: u32, found: u32 },
    #[error("failed to normalise answer: {0}")]
    Normalize(#[from] NormalizeError),
}

impl ClientError {
    /// Category reported to the caller.
    ///
    /// Failures to reach or hear from the server are connection errors;
    /// an answer that arrived but cannot be understood is unknown.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolve { .. }
            | Self::Connect { .. }
            | Self::Configure { .. }
            | Self::Send(_)
            | Self::Receive(_)
            | Self::TimedOut { .. }
            | Self::Closed { .. } => ErrorKind::Connection,
            #[cfg(not(unix))]
            Self::UnsupportedUnixTransport(_) => ErrorKind::Connection,
            Self::TooLarge { .. }
            | Self::Decode(_)
            | Self::Envelope(_)
            | Self::UnexpectedRequest
            | Self::MismatchedId { .. }
            | Self::Normalize(_) => ErrorKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::refused(
        ClientError::Connect {
            endpoint: "tcp://127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        },
        ErrorKind::Connection
    )]
    #[case::timeout(ClientError::TimedOut { timeout: Duration::from_secs(1) }, ErrorKind::Connection)]
    #[case::closed(ClientError::Closed { received: 0 }, ErrorKind::Connection)]
    #[case::configure(
        ClientError::Configure {
            endpoint: "unix:///run/mpbridge.sock".into(),
            source: io::Error::from(io::ErrorKind::InvalidInput),
        },
        ErrorKind::Connection
    )]
    #[case::oversized(ClientError::TooLarge { limit: 1024 }, ErrorKind::Unknown)]
    #[case::mismatch(ClientError::MismatchedId { expected: 1, found: 2 }, ErrorKind::Unknown)]
    #[case::request(ClientError::UnexpectedRequest, ErrorKind::Unknown)]
    fn errors_map_to_categories(#[case] error: ClientError, #[case] kind: ErrorKind) {
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn configure_failure_does_not_claim_a_read() {
        let error = ClientError::Configure {
            endpoint: "tcp://127.0.0.1:9779".into(),
            source: io::Error::from(io::ErrorKind::InvalidInput),
        };
        let message = error.to_string();
        assert!(message.contains("configure connection"), "{message}");
        assert!(!message.contains("read answer"), "{message}");
    }
}
