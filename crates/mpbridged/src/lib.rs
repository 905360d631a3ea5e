//! Server side of the mpbridge msgpack-RPC bridge.
//!
//! A client opens a connection, sends one msgpack-rpc request
//! `[0, msg_id, "namespace/action", [{arguments}]]` and receives one answer
//! `[1, msg_id, nil, result]`. The server resolves the namespace to a
//! controller registered at startup, runs it against a fresh
//! [`Response`](mpbridge_proto::Response) and writes the response back. Any
//! failure after the request was read is answered with an error structure
//! instead of a dropped connection.
//!
//! The pieces, from the socket inwards:
//!
//! - [`transport`]: the TCP/Unix listener (one thread per connection) and the
//!   [`FrameReader`](transport::FrameReader) that accumulates bytes until a
//!   frame decodes, bounded by a per-read inactivity timeout.
//! - [`dispatch`]: the controller registry, the dispatcher and the
//!   connection handler tying them to the transport.
//! - [`bootstrap`] and [`telemetry`]: process wiring and structured logging.

mod bootstrap;
pub mod dispatch;
mod health;
pub mod telemetry;
#[cfg(test)]
mod test_support;
pub mod transport;

pub use bootstrap::{BootstrapError, Server, bootstrap, bootstrap_with};
pub use health::{HealthEvent, HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};
