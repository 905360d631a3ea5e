//! Recursive conversion of decoded byte-strings into text.
//!
//! Peers speaking the old msgpack "raw" type send every string as bytes, and
//! some of them send bytes that are not UTF-8 at all. [`normalize`] walks a
//! decoded value and turns every byte-string into text: UTF-8 when it is
//! valid, ISO-8859-1 otherwise. The fallback can never fail, so it also
//! masks genuinely corrupt data; each use is reported at debug level under
//! the `mpbridge-proto::normalize` target.

use rmpv::Value;
use thiserror::Error;
use tracing::debug;

use crate::envelope::value_kind;

const NORMALIZE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::normalize");

/// Errors raised when a map key cannot be turned into text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The key bytes are not valid UTF-8.
    #[error("map key is not valid UTF-8: {lossy}")]
    KeyNotUtf8 {
        /// Lossy rendering of the key.
        lossy: String,
    },
    /// The key is not a string or byte-string.
    #[error("map key must be text, found {found}")]
    NonTextKey {
        /// Kind of value used as a key.
        found: &'static str,
    },
}

/// Selects how much of a decoded answer is normalised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Keys and values throughout the tree.
    #[default]
    Full,
    /// Map keys only; values keep their original encoding.
    KeysOnly,
    /// No conversion.
    Raw,
}

impl NormalizeMode {
    /// Applies the selected conversion to `value`.
    ///
    /// # Errors
    ///
    /// Propagates [`NormalizeError`] for keys that cannot become text.
    pub fn apply(self, value: Value) -> Result<Value, NormalizeError> {
        match self {
            Self::Full => normalize(value),
            Self::KeysOnly => normalize_keys(value),
            Self::Raw => Ok(value),
        }
    }
}

/// Converts every byte-string in `value`, keys included, into text.
///
/// Numbers, booleans, nil and extension values pass through unchanged and
/// sequence order is preserved. The function is idempotent.
///
/// # Errors
///
/// Returns [`NormalizeError`] when a map key is not text or not UTF-8.
pub fn normalize(value: Value) -> Result<Value, NormalizeError> {
    match value {
        Value::Map(entries) => entries
            .into_iter()
            .map(|(key, item)| Ok((normalize_key(key)?, normalize(item)?)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Map),
        Value::Array(items) => items
            .into_iter()
            .map(normalize)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Binary(bytes) => Ok(Value::from(decode_text(bytes))),
        Value::String(text) if !text.is_str() => Ok(Value::from(decode_text(text.into_bytes()))),
        other => Ok(other),
    }
}

/// Converts only map keys into text, recursing through nested maps.
///
/// Values, sequences included, keep their original encoding.
///
/// # Errors
///
/// Returns [`NormalizeError`] when a map key is not text or not UTF-8.
pub fn normalize_keys(value: Value) -> Result<Value, NormalizeError> {
    match value {
        Value::Map(entries) => entries
            .into_iter()
            .map(|(key, item)| {
                let item = match item {
                    nested @ Value::Map(_) => normalize_keys(nested)?,
                    other => other,
                };
                Ok((normalize_key(key)?, item))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Map),
        other => Ok(other),
    }
}

/// Decodes bytes as UTF-8, falling back to one code point per byte.
pub fn decode_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|error| {
        let bytes = error.into_bytes();
        debug!(
            target: NORMALIZE_TARGET,
            len = bytes.len(),
            "byte-string is not UTF-8; decoding as ISO-8859-1"
        );
        bytes.into_iter().map(char::from).collect()
    })
}

fn normalize_key(key: Value) -> Result<Value, NormalizeError> {
    let bytes = match key {
        Value::String(text) if text.is_str() => return Ok(Value::String(text)),
        Value::String(text) => text.into_bytes(),
        Value::Binary(bytes) => bytes,
        other => {
            return Err(NormalizeError::NonTextKey {
                found: value_kind(&other),
            });
        }
    };
    String::from_utf8(bytes)
        .map(Value::from)
        .map_err(|error| NormalizeError::KeyNotUtf8 {
            lossy: String::from_utf8_lossy(error.as_bytes()).into_owned(),
        })
}

/// Whether any byte-string (or non-UTF-8 string) remains in `value`.
pub fn contains_bytes(value: &Value) -> bool {
    match value {
        Value::Binary(_) => true,
        Value::String(text) => !text.is_str(),
        Value::Array(items) => items.iter().any(contains_bytes),
        Value::Map(entries) => entries
            .iter()
            .any(|(key, item)| contains_bytes(key) || contains_bytes(item)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn bytes(text: &[u8]) -> Value {
        Value::Binary(text.to_vec())
    }

    fn nested_sample() -> Value {
        Value::Map(vec![
            (bytes(b"name"), bytes(b"caf\xc3\xa9")),
            (bytes(b"count"), Value::from(3)),
            (bytes(b"ratio"), Value::F64(0.5)),
            (bytes(b"missing"), Value::Nil),
            (bytes(b"flag"), Value::Boolean(true)),
            (
                bytes(b"items"),
                Value::Array(vec![
                    bytes(b"a"),
                    Value::Array(vec![bytes(b"b"), Value::from(-1)]),
                    Value::Map(vec![(bytes(b"inner"), bytes(b"\xff"))]),
                ]),
            ),
        ])
    }

    #[test]
    fn converts_latin1_fallback_without_failing() {
        let value = Value::Map(vec![(bytes(b"key"), bytes(b"caf\xe9-bytes"))]);
        let normalised = normalize(value).expect("normalise");
        assert_eq!(
            normalised,
            Value::Map(vec![(Value::from("key"), Value::from("caf\u{e9}-bytes"))])
        );
    }

    #[test]
    fn converts_nested_structures() {
        let normalised = normalize(nested_sample()).expect("normalise");
        let expected = Value::Map(vec![
            (Value::from("name"), Value::from("caf\u{e9}")),
            (Value::from("count"), Value::from(3)),
            (Value::from("ratio"), Value::F64(0.5)),
            (Value::from("missing"), Value::Nil),
            (Value::from("flag"), Value::Boolean(true)),
            (
                Value::from("items"),
                Value::Array(vec![
                    Value::from("a"),
                    Value::Array(vec![Value::from("b"), Value::from(-1)]),
                    Value::Map(vec![(Value::from("inner"), Value::from("\u{ff}"))]),
                ]),
            ),
        ]);
        assert_eq!(normalised, expected);
        assert!(!contains_bytes(&normalised));
    }

    #[test]
    fn is_idempotent() {
        let once = normalize(nested_sample()).expect("first pass");
        let twice = normalize(once.clone()).expect("second pass");
        assert_eq!(once, twice);
    }

    #[rstest]
    #[case::nil(Value::Nil)]
    #[case::integer(Value::from(42))]
    #[case::float(Value::F32(1.5))]
    #[case::boolean(Value::Boolean(false))]
    #[case::text(Value::from("already text"))]
    fn scalars_pass_through(#[case] value: Value) {
        assert_eq!(normalize(value.clone()).expect("normalise"), value);
    }

    #[rstest]
    #[case::integer_key(Value::from(1), "must be text")]
    #[case::invalid_utf8_key(bytes(b"\xff"), "not valid UTF-8")]
    fn rejects_unconvertible_keys(#[case] key: Value, #[case] fragment: &str) {
        let value = Value::Map(vec![(key, Value::Nil)]);
        let error = normalize(value).expect_err("key should be rejected");
        assert!(error.to_string().contains(fragment));
    }

    #[test]
    fn keys_only_leaves_values_encoded() {
        let normalised = normalize_keys(nested_sample()).expect("normalise keys");
        let Value::Map(entries) = normalised else {
            panic!("expected a map");
        };
        assert!(entries.iter().all(|(key, _)| key.as_str().is_some()));
        assert_eq!(
            entries.first().map(|(_, value)| value),
            Some(&bytes(b"caf\xc3\xa9"))
        );
        let items = entries
            .iter()
            .find(|(key, _)| key.as_str() == Some("items"))
            .map(|(_, value)| value);
        assert!(items.is_some_and(contains_bytes), "sequences stay raw");
    }

    #[test]
    fn keys_only_recurses_into_nested_maps() {
        let value = Value::Map(vec![(
            bytes(b"outer"),
            Value::Map(vec![(bytes(b"inner"), bytes(b"raw"))]),
        )]);
        let normalised = normalize_keys(value).expect("normalise keys");
        assert_eq!(
            normalised,
            Value::Map(vec![(
                Value::from("outer"),
                Value::Map(vec![(Value::from("inner"), bytes(b"raw"))]),
            )])
        );
    }

    #[rstest]
    #[case::full(NormalizeMode::Full, Value::from("v"))]
    #[case::keys_only(NormalizeMode::KeysOnly, bytes(b"v"))]
    #[case::raw(NormalizeMode::Raw, bytes(b"v"))]
    fn modes_select_conversion(#[case] mode: NormalizeMode, #[case] expected_value: Value) {
        let value = Value::Map(vec![(bytes(b"k"), bytes(b"v"))]);
        let converted = mode.apply(value).expect("apply mode");
        let Value::Map(entries) = converted else {
            panic!("expected a map");
        };
        assert_eq!(entries.first().map(|(_, value)| value), Some(&expected_value));
    }
}
