//! Demo bridge server serving the echo controller under `test/*`.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mpbridge_config::{
    Config, DEFAULT_CONTROLLERS_PREFIX, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_READ_TIMEOUT_SECS, LogFormat, SocketEndpoint, default_socket_endpoint,
};
use mpbridged::dispatch::{ControllerRegistry, EchoController, SequentialRequestIds};
use mpbridged::{BootstrapError, bootstrap};
use tracing::error;

/// Serve msgpack-rpc requests, one per connection.
#[derive(Debug, Parser)]
#[command(name = "mpbridged", version, about)]
struct Cli {
    /// Endpoint to listen on (`tcp://host:port` or `unix:///path`).
    #[arg(long, default_value_t = default_socket_endpoint())]
    listen: SocketEndpoint,
    /// Seconds a connection may stay silent while a request is read.
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_SECS)]
    read_timeout: u64,
    /// Prefix qualifying controller lookup keys.
    #[arg(long, default_value = DEFAULT_CONTROLLERS_PREFIX)]
    controllers_prefix: String,
    /// Largest request accepted, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    max_frame_bytes: usize,
    /// `tracing` filter directive.
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
    /// Log output format.
    #[arg(long, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

impl Cli {
    fn into_config(self) -> Config {
        Config::default()
            .with_listen(self.listen)
            .with_read_timeout_secs(self.read_timeout)
            .with_controllers_prefix(self.controllers_prefix)
            .with_max_frame_bytes(self.max_frame_bytes)
            .with_logging(self.log_filter, self.log_format)
    }
}

#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error(transparent)]
    Registry(#[from] mpbridged::dispatch::RegistryError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Listener(#[from] mpbridged::transport::ListenerError),
}

fn serve(config: Config) -> Result<(), ServeError> {
    let registry = ControllerRegistry::builder(config.controllers_prefix())
        .register("test", EchoController::factory())?
        .build();
    let server = bootstrap(config, registry, Arc::new(SequentialRequestIds::new()))?;
    server.run()?;
    Ok(())
}

fn main() -> ExitCode {
    let config = Cli::parse().into_config();
    match serve(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!(target: "mpbridged::main", error = %failure, "server stopped");
            let _ = writeln!(io::stderr().lock(), "mpbridged: {failure}");
            ExitCode::FAILURE
        }
    }
}
