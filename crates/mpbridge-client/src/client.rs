//! The client call path: one connection and one request per call.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use mpbridge_config::{Config, DEFAULT_MAX_FRAME_BYTES, DEFAULT_REQUEST_TIMEOUT_SECS, SocketEndpoint};
use mpbridge_proto::frame::write_frame;
use mpbridge_proto::{
    Arguments, DecodeOutcome, ErrorKind, Message, NormalizeMode, Response, Route, Value,
    try_decode,
};
use tracing::{error, info};

use crate::errors::ClientError;
use crate::transport::{self, Connection};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");
const READ_CHUNK_BYTES: usize = 4096;

/// Issues calls to one bridge server.
///
/// [`RpcClient::call`] never fails: transport problems come back as
/// `connection` errors and unintelligible answers as `unknown` errors, so
/// callers check [`Response::has_error`] before reading the result.
#[derive(Debug)]
pub struct RpcClient {
    endpoint: SocketEndpoint,
    timeout: Duration,
    mode: NormalizeMode,
    max_answer_bytes: usize,
    next_msg_id: AtomicU32,
}

impl RpcClient {
    /// Creates a client with the default request timeout and full normalisation.
    pub fn new(endpoint: SocketEndpoint) -> Self {
        Self {
            endpoint,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            mode: NormalizeMode::default(),
            max_answer_bytes: DEFAULT_MAX_FRAME_BYTES,
            next_msg_id: AtomicU32::new(1),
        }
    }

    /// Creates a client for the configured endpoint and request timeout.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.listen().clone())
            .with_timeout(config.request_timeout())
            .with_max_answer_bytes(config.max_frame_bytes())
    }

    /// Replaces the whole-call timeout; zero waits indefinitely.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Selects how answers are normalised.
    #[must_use]
    pub fn with_normalize_mode(mut self, mode: NormalizeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Caps the bytes buffered while an answer is incomplete.
    #[must_use]
    pub fn with_max_answer_bytes(mut self, bytes: usize) -> Self {
        self.max_answer_bytes = bytes;
        self
    }

    /// Replaces the whole-call timeout in place.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Endpoint calls are sent to.
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Whole-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Calls `route` with `arguments`.
    ///
    /// The route is validated before any socket is opened; an invalid route
    /// yields a `bad_request` response.
    pub fn call(&self, route: &str, arguments: Arguments) -> Response {
        let route = match Route::parse(route) {
            Ok(route) => route,
            Err(invalid) => {
                error!(target: CLIENT_TARGET, error = %invalid, "invalid route");
                return Response::with_error(ErrorKind::BadRequest, Some(invalid.to_string()), None);
            }
        };

        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        info!(
            target: CLIENT_TARGET,
            endpoint = %self.endpoint,
            route = %route,
            msg_id,
            "sending request"
        );
        match self.exchange(msg_id, &route, arguments) {
            Ok(response) => {
                info!(
                    target: CLIENT_TARGET,
                    route = %route,
                    msg_id,
                    has_error = response.has_error(),
                    "answer received"
                );
                response
            }
            Err(failure) => {
                error!(
                    target: CLIENT_TARGET,
                    endpoint = %self.endpoint,
                    route = %route,
                    error = %failure,
                    "call failed"
                );
                Response::with_error(failure.kind(), Some(failure.to_string()), None)
            }
        }
    }

    /// Alias of [`RpcClient::call`].
    pub fn request(&self, route: &str, arguments: Arguments) -> Response {
        self.call(route, arguments)
    }

    fn exchange(
        &self,
        msg_id: u32,
        route: &Route,
        arguments: Arguments,
    ) -> Result<Response, ClientError> {
        let bound = (!self.timeout.is_zero()).then_some(self.timeout);
        let deadline = bound.map(|timeout| Instant::now() + timeout);

        let mut connection = transport::connect(&self.endpoint, bound)?;
        connection
            .set_write_timeout(bound)
            .map_err(|source| ClientError::Configure {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        let request = Message::request(msg_id, route.to_string(), arguments).into_value();
        write_frame(&mut connection, &request).map_err(ClientError::Send)?;

        let answer = self.read_answer(&mut connection, deadline)?;
        match Message::from_value(answer)? {
            Message::Response {
                msg_id: found,
                error,
                result,
            } => {
                if found != msg_id {
                    return Err(ClientError::MismatchedId {
                        expected: msg_id,
                        found,
                    });
                }
                let result = self.mode.apply(result)?;
                Ok(Response::from_envelope(error, result))
            }
            Message::Request { .. } => Err(ClientError::UnexpectedRequest),
        }
    }

    fn read_answer(
        &self,
        connection: &mut Connection,
        deadline: Option<Instant>,
    ) -> Result<Value, ClientError> {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        loop {
            let remaining = match deadline {
                Some(deadline) => Some(
                    deadline
                        .checked_duration_since(Instant::now())
                        .filter(|left| !left.is_zero())
                        .ok_or(ClientError::TimedOut {
                            timeout: self.timeout,
                        })?,
                ),
                None => None,
            };
            connection
                .set_read_timeout(remaining)
                .map_err(ClientError::Receive)?;

            let read = match connection.read(&mut chunk) {
                Ok(0) => {
                    return Err(ClientError::Closed {
                        received: buffer.len(),
                    });
                }
                Ok(read) => read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(ClientError::TimedOut {
                        timeout: self.timeout,
                    });
                }
                Err(error) => return Err(ClientError::Receive(error)),
            };
            buffer.extend_from_slice(chunk.get(..read).unwrap_or(&chunk));

            match try_decode(&buffer) {
                DecodeOutcome::Complete { value, .. } => return Ok(value),
                DecodeOutcome::Incomplete if buffer.len() > self.max_answer_bytes => {
                    return Err(ClientError::TooLarge {
                        limit: self.max_answer_bytes,
                    });
                }
                DecodeOutcome::Incomplete => {}
                DecodeOutcome::Invalid(invalid) => return Err(ClientError::Decode(invalid)),
            }
        }
    }
}
