//! CLI entrypoint for calling an mpbridge server.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    mpbridge_client::run(std::env::args_os(), &mut stdout, &mut stderr)
}
