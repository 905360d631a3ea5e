//! The controller contract and the bundled echo controller.

use std::sync::Arc;

use mpbridge_proto::{Arguments, ArgumentsError, Response};
use thiserror::Error;
use tracing::{Span, debug};

use super::DISPATCH_TARGET;

/// Everything a controller is constructed from.
#[derive(Debug, Clone)]
pub struct ControllerContext {
    /// Action half of the route.
    pub action: String,
    /// Decoded argument map of the request.
    pub arguments: Arguments,
    /// Span of the request; controllers log inside it.
    pub span: Span,
}

/// Failure reported by a controller; answered as an `unknown` error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ControllerError {
    message: String,
}

impl ControllerError {
    /// Creates an error with the message sent back to the caller.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Message sent back to the caller.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ArgumentsError> for ControllerError {
    fn from(error: ArgumentsError) -> Self {
        Self::new(error.to_string())
    }
}

/// Application unit implementing one namespace's actions.
///
/// The dispatcher owns the [`Response`] and lends it for the duration of
/// [`Controller::start`]. A controller may record a result or an error on it;
/// returning `Err` records an `unknown` error on top of whatever was set.
pub trait Controller: Send {
    /// Runs the action selected at construction.
    fn start(&mut self, response: &mut Response) -> Result<(), ControllerError>;
}

/// Builds a controller for one request.
pub type ControllerFactory = Arc<dyn Fn(ControllerContext) -> Box<dyn Controller> + Send + Sync>;

/// Wraps a constructor of a concrete controller type into a [`ControllerFactory`].
pub fn controller_factory<C, F>(build: F) -> ControllerFactory
where
    C: Controller + 'static,
    F: Fn(ControllerContext) -> C + Send + Sync + 'static,
{
    Arc::new(move |context: ControllerContext| -> Box<dyn Controller> {
        Box::new(build(context))
    })
}

/// Controller answering every action with the arguments it received.
#[derive(Debug)]
pub struct EchoController {
    context: ControllerContext,
}

impl EchoController {
    /// Creates the controller.
    pub fn new(context: ControllerContext) -> Self {
        Self { context }
    }

    /// Factory suitable for [`RegistryBuilder::register`](super::RegistryBuilder::register).
    pub fn factory() -> ControllerFactory {
        controller_factory(Self::new)
    }
}

impl Controller for EchoController {
    fn start(&mut self, response: &mut Response) -> Result<(), ControllerError> {
        let _entered = self.context.span.enter();
        debug!(
            target: DISPATCH_TARGET,
            action = %self.context.action,
            arguments = self.context.arguments.len(),
            "echoing arguments"
        );
        response.set_method_result(self.context.arguments.to_value());
        Ok(())
    }
}
