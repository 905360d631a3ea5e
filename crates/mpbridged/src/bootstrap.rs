//! Server bootstrap orchestration.

use std::sync::Arc;

use thiserror::Error;

use mpbridge_config::{Config, SocketPreparationError};

use crate::dispatch::{ControllerRegistry, Dispatcher, RequestLifecycle, RpcConnectionHandler};
use crate::health::{HealthEvent, HealthReporter, StructuredHealthReporter};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{FrameReader, ListenerError, ListenerHandle, SocketListener};

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare server socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The registry was built for a different controller prefix.
    #[error("registry prefix '{registered}' does not match configured prefix '{configured}'")]
    Prefix {
        /// Prefix from the configuration.
        configured: String,
        /// Prefix the registry was built with.
        registered: String,
    },
}

/// Bridge server ready to accept connections.
pub struct Server {
    config: Config,
    handler: Arc<RpcConnectionHandler>,
    reporter: Arc<dyn HealthReporter>,
    telemetry: Option<TelemetryHandle>,
}

impl Server {
    /// Assembles a server without touching global telemetry.
    pub fn new(
        config: Config,
        registry: ControllerRegistry,
        lifecycle: Arc<dyn RequestLifecycle>,
    ) -> Self {
        let reader = FrameReader::new(config.read_timeout(), config.max_frame_bytes());
        let dispatcher = Dispatcher::new(Arc::new(registry));
        Self {
            config,
            handler: Arc::new(RpcConnectionHandler::new(dispatcher, reader, lifecycle)),
            reporter: Arc::new(StructuredHealthReporter::new()),
            telemetry: None,
        }
    }

    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Telemetry handle when the server was bootstrapped.
    #[must_use]
    pub fn telemetry(&self) -> Option<TelemetryHandle> {
        self.telemetry
    }

    /// Binds the configured endpoint and serves on a background thread.
    pub fn start(&self) -> Result<ListenerHandle, ListenerError> {
        let listener = SocketListener::bind(self.config.listen())?;
        let handle = listener.start(self.handler.clone())?;
        self.reporter.report(&HealthEvent::Listening {
            endpoint: handle.endpoint(),
        });
        Ok(handle)
    }

    /// Serves until the listener stops.
    pub fn run(&self) -> Result<(), ListenerError> {
        self.start()?.join()
    }
}

/// Bootstraps the server with the structured health reporter.
pub fn bootstrap(
    config: Config,
    registry: ControllerRegistry,
    lifecycle: Arc<dyn RequestLifecycle>,
) -> Result<Server, BootstrapError> {
    bootstrap_with(
        config,
        registry,
        lifecycle,
        Arc::new(StructuredHealthReporter::new()),
    )
}

/// Bootstraps the server using the supplied reporter.
///
/// Installs telemetry, checks that the registry was built for the configured
/// controller prefix and prepares the socket directory.
pub fn bootstrap_with(
    config: Config,
    registry: ControllerRegistry,
    lifecycle: Arc<dyn RequestLifecycle>,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Server, BootstrapError> {
    reporter.report(&HealthEvent::Starting);
    match prepare(&config, &registry) {
        Ok(telemetry) => {
            reporter.report(&HealthEvent::Ready {
                config: &config,
                controllers: registry.len(),
            });
            let mut server = Server::new(config, registry, lifecycle);
            server.reporter = reporter;
            server.telemetry = Some(telemetry);
            Ok(server)
        }
        Err(error) => {
            reporter.report(&HealthEvent::Failed { error: &error });
            Err(error)
        }
    }
}

fn prepare(
    config: &Config,
    registry: &ControllerRegistry,
) -> Result<TelemetryHandle, BootstrapError> {
    let telemetry =
        telemetry::initialise(config).map_err(|source| BootstrapError::Telemetry { source })?;
    if registry.prefix() != config.controllers_prefix() {
        return Err(BootstrapError::Prefix {
            configured: config.controllers_prefix().to_owned(),
            registered: registry.prefix().to_owned(),
        });
    }
    config
        .listen()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;
    Ok(telemetry)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mpbridge_config::{LogFormat, SocketEndpoint};
    use rstest::rstest;

    use super::*;
    use crate::dispatch::{EchoController, NoopLifecycle};

    /// Reporter remembering milestone names and the announced endpoint.
    #[derive(Default)]
    struct Recording {
        names: Mutex<Vec<&'static str>>,
        endpoint: Mutex<Option<SocketEndpoint>>,
    }

    impl Recording {
        fn names(&self) -> Vec<&'static str> {
            self.names.lock().expect("names lock").clone()
        }
    }

    impl HealthReporter for Recording {
        fn report(&self, event: &HealthEvent<'_>) {
            self.names.lock().expect("names lock").push(event.name());
            if let HealthEvent::Listening { endpoint } = event {
                *self.endpoint.lock().expect("endpoint lock") = Some((*endpoint).clone());
            }
        }
    }

    fn config() -> Config {
        Config::default()
            .with_listen(SocketEndpoint::tcp("127.0.0.1", 0))
            .with_logging("off", LogFormat::Compact)
    }

    fn registry(prefix: &str) -> ControllerRegistry {
        ControllerRegistry::builder(prefix)
            .register("test", EchoController::factory())
            .expect("register echo")
            .build()
    }

    fn run_bootstrap(
        config: Config,
        prefix: &str,
    ) -> (Arc<Recording>, Result<Server, BootstrapError>) {
        let reporter = Arc::new(Recording::default());
        let result = bootstrap_with(
            config,
            registry(prefix),
            Arc::new(NoopLifecycle),
            reporter.clone(),
        );
        (reporter, result)
    }

    #[test]
    fn successful_bootstrap_reports_ready() {
        let (reporter, result) = run_bootstrap(config(), "controllers");

        let server = result.expect("bootstrap");
        assert!(server.telemetry().is_some());
        assert_eq!(reporter.names(), ["bootstrap_starting", "bootstrap_succeeded"]);
    }

    #[rstest]
    #[case::foreign_prefix(config(), "handlers")]
    #[case::empty_prefix(config(), "")]
    fn mismatched_prefix_fails_bootstrap(#[case] config: Config, #[case] prefix: &str) {
        let (reporter, result) = run_bootstrap(config, prefix);

        let error = result.err().expect("prefix mismatch");
        assert!(matches!(error, BootstrapError::Prefix { .. }));
        assert_eq!(reporter.names(), ["bootstrap_starting", "bootstrap_failed"]);
    }

    #[cfg(unix)]
    #[test]
    fn unix_socket_directory_is_prepared() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("run").join("mpbridged.sock");
        let config = config().with_listen(SocketEndpoint::unix(
            path.to_str().expect("utf8 path").to_owned(),
        ));

        let (_, result) = run_bootstrap(config, "controllers");

        result.expect("bootstrap");
        assert!(dir.path().join("run").is_dir());
    }

    #[test]
    fn started_server_announces_resolved_port() {
        let (reporter, result) = run_bootstrap(config(), "controllers");
        let server = result.expect("bootstrap");

        let handle = server.start().expect("start");
        let announced = reporter.endpoint.lock().expect("endpoint lock").clone();
        assert_eq!(announced.as_ref(), Some(handle.endpoint()));
        assert!(matches!(announced, Some(SocketEndpoint::Tcp { port, .. }) if port != 0));
        handle.shutdown();
        handle.join().expect("join");
    }
}
