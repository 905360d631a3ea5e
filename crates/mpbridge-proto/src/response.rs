//! Uniform success/error response envelope.
//!
//! A [`Response`] starts empty and is populated once: either with a method
//! result or with a [`RequestError`]. An error always wins: adding one
//! discards any result already stored, and a result offered after an error
//! is refused. On the wire a successful response is the raw result value and
//! a failed one is `{"request_error": {"type", "message", "code"}}`.

use rmpv::Value;
use serde::Serialize;

use crate::frame::{DecodeOutcome, try_decode};
use crate::normalize::{NormalizeMode, decode_text};

/// Map key wrapping the error structure in a dumped response.
pub const REQUEST_ERROR_KEY: &str = "request_error";

/// Closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed route or unresolvable controller; the caller can fix it.
    BadRequest,
    /// The transport could not reach the peer or timed out; retryable.
    Connection,
    /// Anything else, including failures raised inside a controller.
    Unknown,
}

impl ErrorKind {
    /// Wire name of the category.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Connection => "connection",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a wire name, returning `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bad_request" => Some(Self::BadRequest),
            "connection" => Some(Self::Connection),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Code used when an occurrence does not supply one.
    pub const fn default_code(self) -> i64 {
        match self {
            Self::BadRequest => 400,
            Self::Connection => 503,
            Self::Unknown => 500,
        }
    }

    /// Message used when an occurrence does not supply one.
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::Connection => "connection failed",
            Self::Unknown => "unknown error",
        }
    }
}

/// Error carried by a failed [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestError {
    /// Error category.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Numeric code, defaulting to the category's code.
    pub code: i64,
}

impl RequestError {
    /// Builds an error, filling in the category defaults for missing parts.
    pub fn new(kind: ErrorKind, message: Option<String>, code: Option<i64>) -> Self {
        Self {
            kind,
            message: message.unwrap_or_else(|| kind.default_message().to_owned()),
            code: code.unwrap_or_else(|| kind.default_code()),
        }
    }

    /// Returns the error as a `{"type", "message", "code"}` map.
    pub fn to_value(&self) -> Value {
        Value::Map(vec![
            (Value::from("type"), Value::from(self.kind.as_str())),
            (Value::from("message"), Value::from(self.message.as_str())),
            (Value::from("code"), Value::from(self.code)),
        ])
    }

    /// Reads an error map; requires a text `message`.
    ///
    /// Unknown or missing types read as [`ErrorKind::Unknown`]; a missing
    /// code falls back to the category default.
    pub fn from_value(value: &Value) -> Option<Self> {
        let entries = value.as_map()?;
        let message = lookup(entries, "message").and_then(text_of)?;
        let kind = lookup(entries, "type")
            .and_then(text_of)
            .and_then(|name| ErrorKind::parse(&name))
            .unwrap_or(ErrorKind::Unknown);
        let code = lookup(entries, "code").and_then(Value::as_i64);
        Some(Self::new(kind, Some(message), code))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Outcome {
    #[default]
    Empty,
    Result(Value),
    Error(RequestError),
}

/// Result-or-error envelope returned by dispatch and by client calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    outcome: Outcome,
}

impl Response {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a response carrying `result`.
    pub fn with_result(result: Value) -> Self {
        Self {
            outcome: Outcome::Result(result),
        }
    }

    /// Creates a response carrying an error of `kind`.
    pub fn with_error(kind: ErrorKind, message: Option<String>, code: Option<i64>) -> Self {
        let mut response = Self::new();
        response.add_request_error(kind, message, code);
        response
    }

    /// Records an error, replacing any stored result or earlier error.
    pub fn add_request_error(&mut self, kind: ErrorKind, message: Option<String>, code: Option<i64>) {
        self.outcome = Outcome::Error(RequestError::new(kind, message, code));
    }

    /// Stores the method result unless an error was already recorded.
    ///
    /// Returns `false` when the result was refused.
    pub fn set_method_result(&mut self, result: Value) -> bool {
        if self.has_error() {
            return false;
        }
        self.outcome = Outcome::Result(result);
        true
    }

    /// Whether the response carries an error.
    pub fn has_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Whether neither a result nor an error has been recorded.
    pub fn is_empty(&self) -> bool {
        matches!(self.outcome, Outcome::Empty)
    }

    /// Returns the recorded error.
    pub fn get_error(&self) -> Option<&RequestError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Returns the method result. Check [`Response::has_error`] first.
    pub fn get_method_result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(result) => Some(result),
            _ => None,
        }
    }

    /// Consumes the response, returning the method result.
    pub fn into_method_result(self) -> Option<Value> {
        match self.outcome {
            Outcome::Result(result) => Some(result),
            _ => None,
        }
    }

    /// Returns the value to encode: the result unchanged, nil when empty, or
    /// the wrapped error structure.
    pub fn dump(&self) -> Value {
        match &self.outcome {
            Outcome::Empty => Value::Nil,
            Outcome::Result(result) => result.clone(),
            Outcome::Error(error) => Value::Map(vec![(
                Value::from(REQUEST_ERROR_KEY),
                error.to_value(),
            )]),
        }
    }

    /// Interprets a dumped value: the error shape becomes an error, anything
    /// else is a result.
    pub fn from_wire(value: Value) -> Self {
        match wrapped_error(&value) {
            Some(error) => Self {
                outcome: Outcome::Error(error),
            },
            None => Self::with_result(value),
        }
    }

    /// Interprets slots 2 and 3 of a response message.
    ///
    /// A nil error slot defers to [`Response::from_wire`] on the result slot.
    /// A non-nil error slot is an error: an error map is read as such, text
    /// becomes the message of an [`ErrorKind::Unknown`] error.
    pub fn from_envelope(error: Value, result: Value) -> Self {
        if error.is_nil() {
            return Self::from_wire(result);
        }
        let request_error = RequestError::from_value(&error)
            .or_else(|| wrapped_error(&error))
            .unwrap_or_else(|| {
                let message = text_of(&error).unwrap_or_else(|| error.to_string());
                RequestError::new(ErrorKind::Unknown, Some(message), None)
            });
        Self {
            outcome: Outcome::Error(request_error),
        }
    }

    /// Builds a response from a raw encoded answer.
    ///
    /// Bytes that do not decode to exactly one value yield an
    /// [`ErrorKind::Unknown`] error whose message is the raw answer.
    pub fn from_raw_answer(raw: &[u8], mode: NormalizeMode) -> Self {
        let value = match try_decode(raw) {
            DecodeOutcome::Complete { value, consumed } if consumed == raw.len() => value,
            _ => {
                return Self::with_error(
                    ErrorKind::Unknown,
                    Some(String::from_utf8_lossy(raw).into_owned()),
                    None,
                );
            }
        };
        match mode.apply(value) {
            Ok(value) => Self::from_wire(value),
            Err(error) => Self::with_error(ErrorKind::Unknown, Some(error.to_string()), None),
        }
    }
}

fn wrapped_error(value: &Value) -> Option<RequestError> {
    match value.as_map()?.as_slice() {
        [(key, inner)] if text_of(key).as_deref() == Some(REQUEST_ERROR_KEY) => {
            RequestError::from_value(inner)
        }
        _ => None,
    }
}

fn lookup<'a>(entries: &'a [(Value, Value)], wanted: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(key, _)| text_of(key).as_deref() == Some(wanted))
        .map(|(_, value)| value)
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(decode_text(text.as_bytes().to_vec())),
        Value::Binary(bytes) => Some(decode_text(bytes.clone())),
        _ => None,
    }
}
