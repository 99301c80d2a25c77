//! `br` entrypoint; delegates to [`bladerunner_cli::run`].

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    bladerunner_cli::run(std::env::args_os(), &mut io::stdout().lock(), &mut io::stderr().lock())
}
