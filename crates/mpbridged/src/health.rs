//! Startup milestones reported to a pluggable observer.

use mpbridge_config::{Config, SocketEndpoint};
use tracing::{error, info};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Milestone reached while bringing the server up.
#[derive(Debug, Clone, Copy)]
pub enum HealthEvent<'a> {
    /// Bootstrap has begun.
    Starting,
    /// Telemetry, registry and socket directory are in place.
    Ready {
        /// Configuration the server will run with.
        config: &'a Config,
        /// Number of registered controllers.
        controllers: usize,
    },
    /// Bootstrap stopped with an error.
    Failed {
        /// The reason.
        error: &'a BootstrapError,
    },
    /// The listener accepts connections.
    Listening {
        /// Bound endpoint, with the resolved TCP port.
        endpoint: &'a SocketEndpoint,
    },
}

impl HealthEvent<'_> {
    /// Stable name recorded in the `event` log field.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Starting => "bootstrap_starting",
            Self::Ready { .. } => "bootstrap_succeeded",
            Self::Failed { .. } => "bootstrap_failed",
            Self::Listening { .. } => "listener_started",
        }
    }
}

/// Receives startup milestones.
pub trait HealthReporter: Send + Sync {
    /// Called once per milestone, in order.
    fn report(&self, event: &HealthEvent<'_>);
}

/// Reporter writing each milestone as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn report(&self, event: &HealthEvent<'_>) {
        let name = event.name();
        match *event {
            HealthEvent::Starting => {
                info!(target: HEALTH_TARGET, event = name, "starting server bootstrap");
            }
            HealthEvent::Ready {
                config,
                controllers,
            } => info!(
                target: HEALTH_TARGET,
                event = name,
                listen = %config.listen(),
                read_timeout_secs = config.read_timeout_secs,
                max_frame_bytes = config.max_frame_bytes(),
                controllers_prefix = config.controllers_prefix(),
                controllers,
                "server bootstrap completed"
            ),
            HealthEvent::Failed { error } => {
                error!(target: HEALTH_TARGET, event = name, %error, "server bootstrap failed");
            }
            HealthEvent::Listening { endpoint } => {
                info!(target: HEALTH_TARGET, event = name, %endpoint, "accepting requests");
            }
        }
    }
}
