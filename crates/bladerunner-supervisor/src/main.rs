//! Supervisor entrypoint; delegates to [`bladerunner_supervisor::run`].

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: tracing writes to stderr from worker threads.
    bladerunner_supervisor::run(std::env::args_os(), &mut io::stdout(), &mut io::stderr())
}
