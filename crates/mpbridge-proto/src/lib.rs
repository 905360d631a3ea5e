//! Wire-level types shared by the mpbridge server and client.
//!
//! Every message on the wire is a msgpack-encoded four slot array:
//!
//! ```text
//! [0, msg_id, "namespace/action", [{arguments}]]   request
//! [1, msg_id, nil | error, result]                 response
//! ```
//!
//! The crate covers the pieces both sides agree on:
//!
//! - [`frame`]: incremental decoding of a buffer that may hold only part of a
//!   message, plus encoding helpers.
//! - [`envelope`]: the typed [`Message`] view of the four slot array.
//! - [`route`]: parsing of `namespace/action` strings and the controller
//!   names derived from them.
//! - [`response`]: the uniform success/error [`Response`] envelope and its
//!   closed error taxonomy.
//! - [`normalize`]: recursive conversion of byte-strings into text.
//!
//! The msgpack codec itself is provided by [`rmpv`].

pub mod envelope;
pub mod frame;
pub mod normalize;
pub mod response;
pub mod route;

pub use envelope::{Arguments, ArgumentsError, EnvelopeError, Message};
pub use frame::{DecodeOutcome, EncodeError, MAX_FRAME_DEPTH, encode, try_decode};
pub use normalize::{NormalizeError, NormalizeMode, decode_text, normalize, normalize_keys};
pub use response::{ErrorKind, REQUEST_ERROR_KEY, RequestError, Response};
pub use route::{Route, RouteParseError};

pub use rmpv::Value;
