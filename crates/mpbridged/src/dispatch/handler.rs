//! Connection handler serving one msgpack-rpc request per connection.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use mpbridge_proto::frame::write_frame;
use mpbridge_proto::{EncodeError, ErrorKind, Message, Response};
use thiserror::Error;
use tracing::{debug, error, info_span};

use crate::transport::{ConnectionHandler, ConnectionStream, FrameError, FrameReader, ReadTimeout};

use super::DISPATCH_TARGET;
use super::dispatcher::Dispatcher;
use super::lifecycle::RequestLifecycle;

#[derive(Debug, Error)]
enum ServeError {
    #[error("failed to read request: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to write response: {0}")]
    Write(#[from] EncodeError),
}

/// Reads one request, dispatches it and writes the answer.
///
/// The answer is `[1, msg_id, nil, dump]` where `dump` is the response's
/// result or its wrapped error. Bytes that can never form a frame, or that
/// outgrow the frame limit, are answered with a `bad_request` under id 0.
/// A connection that times out or closes before a complete frame arrives is
/// logged and closed without an answer.
pub struct RpcConnectionHandler {
    dispatcher: Dispatcher,
    reader: FrameReader,
    lifecycle: Arc<dyn RequestLifecycle>,
}

impl RpcConnectionHandler {
    /// Creates a handler.
    pub fn new(
        dispatcher: Dispatcher,
        reader: FrameReader,
        lifecycle: Arc<dyn RequestLifecycle>,
    ) -> Self {
        Self {
            dispatcher,
            reader,
            lifecycle,
        }
    }

    /// Serves one request on `stream`, labelling logs with `peer`.
    pub fn serve<S>(&self, stream: &mut S, peer: &str)
    where
        S: Read + Write + ReadTimeout,
    {
        let started = Instant::now();
        let request_id = self.lifecycle.request_id_generate();
        let span = info_span!(
            target: DISPATCH_TARGET,
            "request",
            request_id = request_id.as_deref(),
            peer
        );
        let _entered = span.enter();

        if let Err(failure) = self.answer(stream) {
            error!(target: DISPATCH_TARGET, error = %failure, "request aborted");
        }

        debug!(
            target: DISPATCH_TARGET,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "request completed"
        );
        self.lifecycle.request_id_clear();
    }

    fn answer<S>(&self, stream: &mut S) -> Result<(), ServeError>
    where
        S: Read + Write + ReadTimeout,
    {
        let frame = match self.reader.read_frame(stream) {
            Ok(frame) => frame,
            Err(failure @ (FrameError::Invalid(_) | FrameError::TooLarge { .. })) => {
                error!(target: DISPATCH_TARGET, error = %failure, "unreadable request frame");
                let response =
                    Response::with_error(ErrorKind::BadRequest, Some(failure.to_string()), None);
                write_frame(stream, &Message::response(0, response.dump()).into_value())?;
                return Ok(());
            }
            Err(failure) => return Err(failure.into()),
        };
        let msg_id = Message::msg_id_hint(&frame);

        let response = match Message::from_value(frame) {
            Ok(Message::Request {
                route, arguments, ..
            }) => self.dispatcher.dispatch(&route, arguments),
            Ok(Message::Response { .. }) => {
                error!(target: DISPATCH_TARGET, msg_id, "received a response message");
                Response::with_error(
                    ErrorKind::BadRequest,
                    Some("expected a request message".to_owned()),
                    None,
                )
            }
            Err(envelope_error) => {
                error!(
                    target: DISPATCH_TARGET,
                    msg_id,
                    error = %envelope_error,
                    "malformed request envelope"
                );
                Response::with_error(ErrorKind::BadRequest, Some(envelope_error.to_string()), None)
            }
        };

        let answer = Message::response(msg_id, response.dump()).into_value();
        write_frame(stream, &answer)?;
        Ok(())
    }
}

impl ConnectionHandler for RpcConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let peer = stream.peer();
        self.serve(&mut stream, &peer);
    }
}
