//! Client side of the mpbridge msgpack-RPC bridge.
//!
//! [`RpcClient`] opens one connection per call, sends
//! `[0, msg_id, "namespace/action", [{arguments}]]`, waits for the answer
//! within the call timeout and hands back a
//! [`Response`](mpbridge_proto::Response). Byte-strings in the answer are
//! normalised into text according to the client's
//! [`NormalizeMode`](mpbridge_proto::NormalizeMode).
//!
//! The call itself never fails. Problems reaching the server surface as
//! `connection` errors (code 503) so callers can retry them specifically;
//! anything else surfaces as `unknown` (code 500).

mod cli;
mod client;
mod errors;
mod transport;

pub use cli::{Mode, run};
pub use client::RpcClient;
pub use errors::ClientError;
