//! Typed view of the four slot msgpack-rpc message array.

use rmpv::Value;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::normalize::{NormalizeError, normalize};

/// Type tag of a request message.
pub const REQUEST_TYPE: u64 = 0;

/// Type tag of a response message.
pub const RESPONSE_TYPE: u64 = 1;

/// Argument map carried in slot 3 of a request.
///
/// Entries keep their wire order; keys are normally text but arrive as raw
/// byte-strings from older peers, so lookups accept either form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Vec<(Value, Value)>);

/// Errors raised while converting an argument map into a typed value.
#[derive(Debug, Error)]
pub enum ArgumentsError {
    /// A key could not be turned into text.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    /// The normalised map does not match the requested type.
    #[error("arguments do not match the expected shape: {0}")]
    Decode(#[from] rmpv::ext::Error),
}

impl Arguments {
    /// Creates an empty argument map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry with a text key, returning the map for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces the entry stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self
            .0
            .iter_mut()
            .find(|(existing, _)| key_matches(existing, &key))
        {
            slot.1 = value;
        } else {
            self.0.push((Value::from(key), value));
        }
    }

    /// Returns the value stored under `key`, accepting text or byte-string keys.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(existing, _)| key_matches(existing, key))
            .map(|(_, value)| value)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the raw entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.0.iter()
    }

    /// Returns the entries as a msgpack map value.
    pub fn to_value(&self) -> Value {
        Value::Map(self.0.clone())
    }

    /// Consumes the arguments and returns a msgpack map value.
    pub fn into_value(self) -> Value {
        Value::Map(self.0)
    }

    /// Normalises the map and deserialises it into `T`.
    ///
    /// # Errors
    ///
    /// Fails when a key is not text or the map does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ArgumentsError> {
        let normalised = normalize(self.to_value())?;
        Ok(rmpv::ext::from_value(normalised)?)
    }
}

impl From<Vec<(Value, Value)>> for Arguments {
    fn from(entries: Vec<(Value, Value)>) -> Self {
        Self(entries)
    }
}

impl TryFrom<Value> for Arguments {
    type Error = EnvelopeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Map(entries) => Ok(Self(entries)),
            Value::Nil => Ok(Self::default()),
            other => Err(EnvelopeError::InvalidArguments {
                found: value_kind(&other),
            }),
        }
    }
}

fn key_matches(key: &Value, wanted: &str) -> bool {
    match key {
        Value::String(text) => text.as_bytes() == wanted.as_bytes(),
        Value::Binary(bytes) => bytes.as_slice() == wanted.as_bytes(),
        _ => false,
    }
}

/// Errors raised when a decoded value is not a well-formed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The message is not an array.
    #[error("message must be an array, found {found}")]
    NotAnArray {
        /// Kind of value received instead.
        found: &'static str,
    },
    /// The message array does not have four slots.
    #[error("message must have 4 slots, found {found}")]
    Arity {
        /// Number of slots received.
        found: usize,
    },
    /// Slot 0 is not a known message type.
    #[error("unsupported message type {found}")]
    UnknownType {
        /// Textual form of the received tag.
        found: String,
    },
    /// Slot 1 is not an unsigned 32-bit message id.
    #[error("invalid message id {found}")]
    InvalidMessageId {
        /// Textual form of the received id.
        found: String,
    },
    /// The route slot is missing or not UTF-8 text.
    #[error("route must be UTF-8 text, found {found}")]
    InvalidRoute {
        /// Kind of value received instead.
        found: &'static str,
    },
    /// The parameter slot does not hold an argument map.
    #[error("request parameters must be a one-element array holding a map, found {found}")]
    InvalidArguments {
        /// Kind of value received instead.
        found: &'static str,
    },
}

/// A decoded msgpack-rpc message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `[0, msg_id, route, [arguments]]`
    Request {
        /// Caller-chosen id echoed in the response.
        msg_id: u32,
        /// Route string, not yet validated as `namespace/action`.
        route: String,
        /// Argument map.
        arguments: Arguments,
    },
    /// `[1, msg_id, error, result]`
    Response {
        /// Id of the request being answered.
        msg_id: u32,
        /// Nil on success, otherwise an error indicator.
        error: Value,
        /// Result value, or the error structure on failure.
        result: Value,
    },
}

impl Message {
    /// Builds a request message.
    pub fn request(msg_id: u32, route: impl Into<String>, arguments: Arguments) -> Self {
        Self::Request {
            msg_id,
            route: route.into(),
            arguments,
        }
    }

    /// Builds a response message with a nil error slot.
    pub fn response(msg_id: u32, result: Value) -> Self {
        Self::Response {
            msg_id,
            error: Value::Nil,
            result,
        }
    }

    /// Returns the message id.
    pub fn msg_id(&self) -> u32 {
        match self {
            Self::Request { msg_id, .. } | Self::Response { msg_id, .. } => *msg_id,
        }
    }

    /// Converts the message into its four slot wire array.
    pub fn into_value(self) -> Value {
        match self {
            Self::Request {
                msg_id,
                route,
                arguments,
            } => Value::Array(vec![
                Value::from(REQUEST_TYPE),
                Value::from(msg_id),
                Value::from(route),
                Value::Array(vec![arguments.into_value()]),
            ]),
            Self::Response {
                msg_id,
                error,
                result,
            } => Value::Array(vec![
                Value::from(RESPONSE_TYPE),
                Value::from(msg_id),
                error,
                result,
            ]),
        }
    }

    /// Interprets a decoded value as a message.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] describing the first slot that does not
    /// match the expected shape.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Array(slots) = value else {
            return Err(EnvelopeError::NotAnArray {
                found: value_kind(&value),
            });
        };
        let [kind, msg_id, third, fourth]: [Value; 4] = slots
            .try_into()
            .map_err(|slots: Vec<Value>| EnvelopeError::Arity { found: slots.len() })?;

        let msg_id = parse_msg_id(&msg_id)?;
        match kind.as_u64() {
            Some(REQUEST_TYPE) => Ok(Self::Request {
                msg_id,
                route: parse_route(third)?,
                arguments: parse_parameters(fourth)?,
            }),
            Some(RESPONSE_TYPE) => Ok(Self::Response {
                msg_id,
                error: third,
                result: fourth,
            }),
            _ => Err(EnvelopeError::UnknownType {
                found: kind.to_string(),
            }),
        }
    }

    /// Best-effort message id of a value that may not be a valid message.
    ///
    /// Used to address an error response to a caller whose request could
    /// not be parsed; falls back to zero.
    pub fn msg_id_hint(value: &Value) -> u32 {
        value
            .as_array()
            .and_then(|slots| slots.get(1))
            .and_then(|slot| parse_msg_id(slot).ok())
            .unwrap_or(0)
    }
}

fn parse_msg_id(value: &Value) -> Result<u32, EnvelopeError> {
    value
        .as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| EnvelopeError::InvalidMessageId {
            found: value.to_string(),
        })
}

fn parse_route(value: Value) -> Result<String, EnvelopeError> {
    let found = value_kind(&value);
    let bytes = match value {
        Value::String(text) => text.into_bytes(),
        Value::Binary(bytes) => bytes,
        _ => return Err(EnvelopeError::InvalidRoute { found }),
    };
    String::from_utf8(bytes).map_err(|_| EnvelopeError::InvalidRoute {
        found: "non-UTF-8 bytes",
    })
}

fn parse_parameters(value: Value) -> Result<Arguments, EnvelopeError> {
    match value {
        Value::Array(params) => match params.into_iter().next() {
            Some(first) => Arguments::try_from(first),
            None => Ok(Arguments::default()),
        },
        other => Err(EnvelopeError::InvalidArguments {
            found: value_kind(&other),
        }),
    }
}

/// Short name of a value's msgpack kind for diagnostics.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "extension",
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde::Deserialize;

    use super::*;

    fn request_value(route: Value, params: Value) -> Value {
        Value::Array(vec![Value::from(0), Value::from(3), route, params])
    }

    #[test]
    fn parses_request_with_text_route() {
        let arguments = Arguments::new().with("my_arg", "myMsg");
        let value = Message::request(3, "test/test", arguments.clone()).into_value();
        let message = Message::from_value(value).expect("parse request");
        assert_eq!(message, Message::request(3, "test/test", arguments));
    }

    #[test]
    fn accepts_binary_route_and_keys() {
        let params = Value::Array(vec![Value::Map(vec![(
            Value::Binary(b"my_arg".to_vec()),
            Value::Binary(b"myMsg".to_vec()),
        )])]);
        let value = request_value(Value::Binary(b"test/test".to_vec()), params);
        let Message::Request {
            route, arguments, ..
        } = Message::from_value(value).expect("parse request")
        else {
            panic!("expected a request");
        };
        assert_eq!(route, "test/test");
        assert_eq!(
            arguments.get("my_arg"),
            Some(&Value::Binary(b"myMsg".to_vec()))
        );
    }

    #[rstest]
    #[case::empty_params(Value::Array(vec![]))]
    #[case::nil_arguments(Value::Array(vec![Value::Nil]))]
    fn missing_arguments_become_empty_map(#[case] params: Value) {
        let value = request_value(Value::from("a/b"), params);
        let Message::Request { arguments, .. } = Message::from_value(value).expect("parse")
        else {
            panic!("expected a request");
        };
        assert!(arguments.is_empty());
    }

    #[test]
    fn parses_response() {
        let value = Message::response(9, Value::from("ok")).into_value();
        let message = Message::from_value(value).expect("parse response");
        assert_eq!(message.msg_id(), 9);
        assert!(matches!(
            message,
            Message::Response { error: Value::Nil, .. }
        ));
    }

    #[rstest]
    #[case::not_array(Value::from("x"), "must be an array")]
    #[case::short(Value::Array(vec![Value::from(0)]), "4 slots")]
    #[case::notification(
        Value::Array(vec![Value::from(2), Value::from("a/b"), Value::Array(vec![]), Value::Nil]),
        "invalid message id"
    )]
    #[case::bad_type(
        Value::Array(vec![Value::from(5), Value::from(0), Value::Nil, Value::Nil]),
        "unsupported message type"
    )]
    #[case::negative_id(
        Value::Array(vec![Value::from(0), Value::from(-1), Value::from("a/b"), Value::Array(vec![])]),
        "invalid message id"
    )]
    #[case::numeric_route(request_value(Value::from(5), Value::Array(vec![])), "route must be")]
    #[case::invalid_utf8_route(
        request_value(Value::Binary(vec![0xff, 0xfe]), Value::Array(vec![])),
        "non-UTF-8"
    )]
    #[case::scalar_params(request_value(Value::from("a/b"), Value::from(1)), "parameters")]
    #[case::list_arguments(
        request_value(Value::from("a/b"), Value::Array(vec![Value::Array(vec![])])),
        "parameters"
    )]
    fn rejects_malformed_messages(#[case] value: Value, #[case] fragment: &str) {
        let error = Message::from_value(value).expect_err("message should be rejected");
        assert!(
            error.to_string().contains(fragment),
            "'{error}' should mention '{fragment}'"
        );
    }

    #[test]
    fn msg_id_hint_survives_malformed_messages() {
        let value = Value::Array(vec![Value::from(0), Value::from(42), Value::from(1)]);
        assert_eq!(Message::msg_id_hint(&value), 42);
        assert_eq!(Message::msg_id_hint(&Value::Nil), 0);
    }

    #[test]
    fn insert_replaces_existing_binary_key() {
        let mut arguments = Arguments::from(vec![(
            Value::Binary(b"name".to_vec()),
            Value::from("old"),
        )]);
        arguments.insert("name", "new");
        assert_eq!(arguments.len(), 1);
        assert_eq!(arguments.get("name"), Some(&Value::from("new")));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Greeting {
        name: String,
        times: u8,
    }

    #[test]
    fn deserialises_normalised_arguments() {
        let arguments = Arguments::from(vec![
            (Value::Binary(b"name".to_vec()), Value::Binary(b"ada".to_vec())),
            (Value::from("times"), Value::from(2)),
        ]);
        let greeting: Greeting = arguments.deserialize().expect("deserialise arguments");
        assert_eq!(
            greeting,
            Greeting {
                name: "ada".to_owned(),
                times: 2
            }
        );
    }
}
