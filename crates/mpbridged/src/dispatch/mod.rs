//! Controller routing and request dispatch.
//!
//! A request names its controller with a `namespace/action` route. The
//! [`ControllerRegistry`] maps the namespace to a factory registered at
//! startup, the [`Dispatcher`] runs the controller against one
//! [`Response`](mpbridge_proto::Response), and the [`RpcConnectionHandler`]
//! ties both to the socket: read one frame, dispatch, write one answer.
//!
//! Every failure on a connection that is still open is answered on the wire:
//!
//! ```text
//! undecodable or oversized frame                      -> bad_request (400), id 0
//! malformed envelope / bad route / unknown controller -> bad_request (400)
//! controller error or panic                           -> unknown (500)
//! ```
//!
//! A read timeout, an early close or a socket error is logged and the
//! connection is dropped without an answer.

mod controller;
mod dispatcher;
mod errors;
mod handler;
mod lifecycle;
mod registry;

pub use self::controller::{
    Controller, ControllerContext, ControllerError, ControllerFactory, EchoController,
    controller_factory,
};
pub use self::dispatcher::Dispatcher;
pub use self::errors::{RegistryError, RouteError};
pub use self::handler::RpcConnectionHandler;
pub use self::lifecycle::{NoopLifecycle, RequestLifecycle, SequentialRequestIds};
pub use self::registry::{ControllerRegistry, RegistryBuilder, ResolvedController};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
