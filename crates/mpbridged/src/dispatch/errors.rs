//! Error types for controller resolution and registration.

use mpbridge_proto::RouteParseError;
use thiserror::Error;

/// Reasons a route cannot be turned into a controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The route is not of the form `namespace/action`.
    #[error(transparent)]
    Parse(#[from] RouteParseError),
    /// No controller is registered under the derived lookup key.
    #[error("no controller registered under '{key}'")]
    UnknownController { key: String },
    /// The lookup key matched, but the derived type name did not.
    #[error("controller '{key}' is registered as {registered}, route derives {derived}")]
    NameMismatch {
        key: String,
        registered: String,
        derived: String,
    },
}

/// Errors raised while building a [`ControllerRegistry`](super::ControllerRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The namespace is empty or contains the route separator.
    #[error("invalid controller namespace '{namespace}'")]
    InvalidNamespace { namespace: String },
    /// Two namespaces derive the same lookup key.
    #[error("controller key '{key}' is already registered")]
    Duplicate { key: String },
}
