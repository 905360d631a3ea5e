//! Command-line interface of the `mpbridge` caller.

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mpbridge_config::{
    DEFAULT_REQUEST_TIMEOUT_SECS, LogFormat, LogSettings, SocketEndpoint, default_socket_endpoint,
};
use mpbridge_proto::{Arguments, NormalizeMode, REQUEST_ERROR_KEY, Response, Value};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

use crate::RpcClient;

/// How answers are normalised before printing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Mode {
    /// Convert every byte-string, keys and values, into text.
    #[default]
    Full,
    /// Convert map keys only.
    KeysOnly,
    /// Print the answer as decoded.
    Raw,
}

impl From<Mode> for NormalizeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => Self::Full,
            Mode::KeysOnly => Self::KeysOnly,
            Mode::Raw => Self::Raw,
        }
    }
}

/// Command-line interface for calling a bridge server.
#[derive(Parser, Debug)]
#[command(name = "mpbridge", version, about, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// `tracing` filter directive for diagnostics on stderr.
    #[arg(long, global = true, default_value = "warn")]
    pub(crate) log_filter: String,
    /// Diagnostic output format (`json` or `compact`).
    #[arg(long, global = true, default_value_t = LogFormat::Compact)]
    pub(crate) log_format: LogFormat,
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Call `namespace/action` and print the result as JSON.
    Call(CallArgs),
}

#[derive(Args, Debug)]
pub(crate) struct CallArgs {
    /// Route in `namespace/action` form.
    #[arg(value_name = "ROUTE")]
    pub(crate) route: String,
    /// Arguments; values are parsed as JSON and fall back to plain text.
    #[arg(value_name = "KEY=VALUE", num_args = 0..)]
    pub(crate) arguments: Vec<String>,
    /// Server endpoint (`tcp://host:port` or `unix:///path`).
    #[arg(long, default_value_t = default_socket_endpoint())]
    pub(crate) endpoint: SocketEndpoint,
    /// Whole-call timeout in seconds; zero waits indefinitely.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub(crate) timeout: u64,
    /// Answer normalisation.
    #[arg(long, value_enum, default_value_t = Mode::Full)]
    pub(crate) mode: Mode,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("argument '{0}' must be in KEY=VALUE form")]
    MalformedArgument(String),
    #[error("failed to convert argument '{key}': {source}")]
    ConvertArgument {
        key: String,
        #[source]
        source: rmpv::ext::Error,
    },
    #[error("failed to render answer: {0}")]
    Render(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("invalid log filter '{filter}': {source}")]
    LogFilter {
        filter: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install log subscriber: {0}")]
    Logging(#[source] Box<dyn std::error::Error + Send + Sync>),
}

static LOGGING_INSTALLED: OnceCell<()> = OnceCell::new();

/// Parses `args`, performs the call and prints the outcome.
///
/// The result, or the `request_error` structure, is written to `stdout` as
/// JSON. Usage problems go to `stderr`. Any error yields a failure exit code.
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(usage) => {
            let _ = write!(stderr, "{usage}");
            return if usage.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if let Err(failure) = init_logging(&LogSettings::new(cli.log_filter, cli.log_format)) {
        let _ = writeln!(stderr, "mpbridge: {failure}");
        return ExitCode::FAILURE;
    }

    let CliCommand::Call(call) = cli.command;
    match execute(&call, stdout) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(failure) => {
            let _ = writeln!(stderr, "mpbridge: {failure}");
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write>(call: &CallArgs, stdout: &mut W) -> Result<bool, CliError> {
    let arguments = parse_arguments(&call.arguments)?;
    let client = RpcClient::new(call.endpoint.clone())
        .with_timeout(Duration::from_secs(call.timeout))
        .with_normalize_mode(call.mode.into());
    let response = client.call(&call.route, arguments);
    render(&response, stdout)?;
    Ok(!response.has_error())
}

fn parse_arguments(raw: &[String]) -> Result<Arguments, CliError> {
    raw.iter().try_fold(Arguments::new(), |arguments, pair| {
        let (key, text) = pair
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| CliError::MalformedArgument(pair.clone()))?;
        let value = parse_value(text).map_err(|source| CliError::ConvertArgument {
            key: key.to_owned(),
            source,
        })?;
        Ok(arguments.with(key, value))
    })
}

fn parse_value(text: &str) -> Result<Value, rmpv::ext::Error> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => rmpv::ext::to_value(json),
        Err(_) => Ok(Value::from(text)),
    }
}

fn render<W: Write>(response: &Response, stdout: &mut W) -> Result<(), CliError> {
    let json = match response.get_error() {
        Some(error) => {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert(REQUEST_ERROR_KEY.to_owned(), serde_json::to_value(error)?);
            serde_json::Value::Object(wrapper)
        }
        None => serde_json::to_value(response.get_method_result().unwrap_or(&Value::Nil))?,
    };
    serde_json::to_writer_pretty(&mut *stdout, &json)?;
    writeln!(stdout)?;
    Ok(())
}

fn init_logging(settings: &LogSettings) -> Result<(), CliError> {
    let filter =
        EnvFilter::try_new(&settings.filter).map_err(|source| CliError::LogFilter {
            filter: settings.filter.clone(),
            source,
        })?;
    // Later calls in the same process keep the first subscriber.
    LOGGING_INSTALLED
        .get_or_try_init(|| {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .with_target(true);
            let installed = match settings.format {
                LogFormat::Json => builder.json().try_init(),
                LogFormat::Compact => builder.compact().try_init(),
            };
            installed.map_err(CliError::Logging)
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("count=3", "count", Value::from(3))]
    #[case("name=bob", "name", Value::from("bob"))]
    #[case("quoted=\"42\"", "quoted", Value::from("42"))]
    #[case("flag=true", "flag", Value::from(true))]
    #[case("expr=a=b", "expr", Value::from("a=b"))]
    fn arguments_parse_as_json_or_text(#[case] raw: &str, #[case] key: &str, #[case] value: Value) {
        let arguments = parse_arguments(&[raw.to_owned()]).expect("arguments");
        assert_eq!(arguments.get(key), Some(&value));
    }

    #[rstest]
    #[case("novalue")]
    #[case("=value")]
    fn malformed_arguments_are_rejected(#[case] raw: &str) {
        let error = parse_arguments(&[raw.to_owned()]).expect_err("malformed");
        assert!(matches!(error, CliError::MalformedArgument(_)));
    }

    #[test]
    fn nested_json_becomes_nested_value() {
        let arguments = parse_arguments(&["list=[1,2]".to_owned()]).expect("arguments");
        assert_eq!(
            arguments.get("list"),
            Some(&Value::Array(vec![Value::from(1), Value::from(2)]))
        );
    }

    #[test]
    fn unreachable_server_prints_connection_error() {
        let port = {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
            listener.local_addr().expect("address").port()
        };
        let endpoint = format!("tcp://127.0.0.1:{port}");
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let args = ["mpbridge", "call", "test/test", "--endpoint", endpoint.as_str()]
            .into_iter()
            .map(OsString::from);

        let code = run(args, &mut stdout, &mut stderr);

        assert_eq!(code, ExitCode::FAILURE);
        let printed: serde_json::Value = serde_json::from_slice(&stdout).expect("json output");
        assert_eq!(printed["request_error"]["type"], "connection");
        assert_eq!(printed["request_error"]["code"], 503);
    }

    #[test]
    fn invalid_route_prints_bad_request() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let args = ["mpbridge", "call", "bogus"].into_iter().map(OsString::from);

        let code = run(args, &mut stdout, &mut stderr);

        assert_eq!(code, ExitCode::FAILURE);
        let printed: serde_json::Value = serde_json::from_slice(&stdout).expect("json output");
        assert_eq!(printed["request_error"]["type"], "bad_request");
    }

    #[rstest]
    #[case(&["mpbridge", "call", "test/test"], LogFormat::Compact)]
    #[case(&["mpbridge", "--log-format", "json", "call", "test/test"], LogFormat::Json)]
    #[case(&["mpbridge", "call", "test/test", "--log-format", "COMPACT"], LogFormat::Compact)]
    fn log_format_flag_is_global(#[case] args: &[&str], #[case] expected: LogFormat) {
        let cli = Cli::try_parse_from(args.iter().copied()).expect("parse arguments");
        assert_eq!(cli.log_format, expected);
    }

    #[test]
    fn invalid_log_filter_is_a_usage_error() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let args = ["mpbridge", "--log-filter", "mpbridge=loud", "call", "test/test"]
            .into_iter()
            .map(OsString::from);

        let code = run(args, &mut stdout, &mut stderr);

        assert_eq!(code, ExitCode::FAILURE);
        assert!(stdout.is_empty(), "no call may be made");
        let message = String::from_utf8(stderr).expect("utf8 stderr");
        assert!(message.contains("invalid log filter 'mpbridge=loud'"), "{message}");
    }

    #[test]
    fn repeated_logging_setup_keeps_first_subscriber() {
        let settings = LogSettings::new("off", LogFormat::Compact);
        init_logging(&settings).expect("first setup");
        init_logging(&LogSettings::new("debug", LogFormat::Json)).expect("second setup");
    }

    #[test]
    fn missing_route_is_a_usage_error() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(
            ["mpbridge", "call"].into_iter().map(OsString::from),
            &mut stdout,
            &mut stderr,
        );
        assert_eq!(code, ExitCode::FAILURE);
        assert!(stdout.is_empty());
        assert!(!stderr.is_empty());
    }
}
