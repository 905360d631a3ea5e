//! Process-wide `tracing` setup for the server binary.
//!
//! Events go to stderr either as one JSON object per line, carrying the
//! active request span, or as compact text. Timestamps are RFC 3339 in UTC
//! and colour is only used when stderr is a terminal.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use mpbridge_config::{Config, LogFormat};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Describes the subscriber serving this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
    reused: bool,
}

impl TelemetryHandle {
    /// Output format of the installed subscriber.
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Whether an earlier call had already installed the subscriber.
    pub fn reused(&self) -> bool {
        self.reused
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter directive does not parse.
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: ParseError,
    },
    /// Something other than this module installed a global subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls keep the subscriber already in place, whatever their
/// configuration, and say so through [`TelemetryHandle::reused`].
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let mut reused = true;
    let format = INSTALLED.get_or_try_init(|| {
        install(config)?;
        reused = false;
        Ok::<_, TelemetryError>(config.log_format())
    })?;
    Ok(TelemetryHandle {
        format: *format,
        reused,
    })
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let layer = output_layer(config.log_format()).with_filter(filter);
    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layer))?;
    Ok(())
}

fn parse_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|source| TelemetryError::Filter {
        filter: directives.to_owned(),
        source,
    })
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(true)
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
