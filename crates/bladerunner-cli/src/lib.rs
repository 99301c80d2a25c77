//! Short-lived command-line client for a Bladerunner VM supervisor.
//!
//! Each invocation opens one or more connections to the supervisor's control
//! socket, runs a single command, and exits. A missing supervisor prints
//! `VM is not running` and exits with status 1; `status` reports `stopped`
//! instead.

mod cli;
mod commands;
mod errors;
mod shutdown;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use bladerunner_control::{ClientConfig, ControlClient};
use clap::Parser;

use crate::cli::Cli;

/// Parses `args`, runs the command, and reports the outcome.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            let _ = write!(stderr, "{error}");
            return ExitCode::from(2);
        }
        Err(help) => {
            let _ = write!(stdout, "{help}");
            return ExitCode::SUCCESS;
        }
    };
    let endpoint = cli.endpoint();
    let client =
        ControlClient::new(ClientConfig::for_endpoint(&endpoint).with_wire_format(cli.wire.format()));
    match commands::execute(&cli.command, &client, &endpoint, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
