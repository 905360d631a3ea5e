//! Runs one request against its controller and always yields a response.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use mpbridge_proto::{Arguments, ErrorKind, Response, Route};
use tracing::{Span, debug, error};

use super::DISPATCH_TARGET;
use super::controller::ControllerContext;
use super::errors::RouteError;
use super::registry::ControllerRegistry;

/// Resolves routes against a shared registry and runs the controllers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ControllerRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    pub fn new(registry: Arc<ControllerRegistry>) -> Self {
        Self { registry }
    }

    /// Registry consulted for every request.
    pub fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Dispatches `route` with `arguments`.
    ///
    /// Never fails: resolution problems become `bad_request` errors and
    /// controller failures, panics included, become `unknown` errors.
    pub fn dispatch(&self, route: &str, arguments: Arguments) -> Response {
        debug!(
            target: DISPATCH_TARGET,
            route,
            arguments = ?arguments,
            "dispatching request"
        );
        let mut response = Response::new();

        let resolved = Route::parse(route)
            .map_err(RouteError::from)
            .and_then(|parsed| Ok((self.registry.resolve(&parsed)?, parsed)));
        let (controller, parsed) = match resolved {
            Ok(found) => found,
            Err(source) => {
                let message = format!("Failed to parse route or get controller. given: {route}");
                error!(
                    target: DISPATCH_TARGET,
                    route,
                    error = %source,
                    "route resolution failed"
                );
                response.add_request_error(ErrorKind::BadRequest, Some(message), None);
                return response;
            }
        };

        debug!(
            target: DISPATCH_TARGET,
            key = %controller.key,
            controller = %controller.type_name,
            action = parsed.action(),
            "controller resolved"
        );
        let context = ControllerContext {
            action: parsed.action().to_owned(),
            arguments,
            span: Span::current(),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut instance = (controller.factory)(context);
            instance.start(&mut response)
        }));

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(failure)) => Some(failure.message().to_owned()),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        if let Some(message) = failure {
            error!(
                target: DISPATCH_TARGET,
                route,
                controller = %controller.type_name,
                error = %message,
                "controller failed"
            );
            response.add_request_error(ErrorKind::Unknown, Some(message), None);
        } else if response.has_error() {
            debug!(
                target: DISPATCH_TARGET,
                route,
                "controller recorded an error"
            );
        }
        response
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "controller panicked".to_owned())
}
