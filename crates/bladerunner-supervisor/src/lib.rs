//! Long-running supervisor for one Bladerunner VM instance.
//!
//! The supervisor is the composition root of the workspace. It prepares the
//! per-instance state directory, serves the control socket with a
//! [`bladerunner_control::LocalController`] and the live runtime config
//! mounted under `config.*`, forwards the guest SSH and API services over
//! vsock when a guest context id is known, and then waits for a `stop`
//! command or a termination signal. Teardown closes the forwarders before
//! the control socket.

mod args;
mod errors;
mod session;
mod shutdown;
mod telemetry;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use bladerunner_tunnel::GuestDialer;
use clap::Parser;

pub use args::SupervisorArgs;
pub use errors::SupervisorError;
pub use session::{Session, SessionOptions};
pub use shutdown::{
    ShutdownCause, ShutdownError, ShutdownNotifier, ShutdownReceiver, ShutdownSignal,
    SignalGuard, SystemShutdownSignal, shutdown_channel,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Runs the supervisor with the given arguments until it is asked to stop.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let args = match SupervisorArgs::try_parse_from(args) {
        Ok(args) => args,
        Err(error) if error.use_stderr() => {
            let _ = write!(stderr, "{error}");
            return ExitCode::FAILURE;
        }
        Err(help) => {
            let _ = write!(stdout, "{help}");
            return ExitCode::SUCCESS;
        }
    };
    match run_with(&args, &SystemShutdownSignal) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "bladerunnerd: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Runs one session with an injected signal source.
///
/// # Errors
///
/// Returns [`SupervisorError`] when telemetry, the session, or the signal
/// listener cannot be set up, or when teardown fails.
pub fn run_with(
    args: &SupervisorArgs,
    signals: &dyn ShutdownSignal,
) -> Result<(), SupervisorError> {
    telemetry::initialise(&args.log_filter, args.log_format)?;

    let mut options = SessionOptions::new(args.control_endpoint(), args.runtime_config());
    options.wire = args.wire;
    options.dialer = guest_dialer(args.guest_cid)?;

    let session = Session::start(options)?;
    // Held until teardown finishes so a second signal cannot cut it short.
    let guard = signals.install(session.notifier())?;
    let cause = session.wait();
    tracing::info!(
        target: SUPERVISOR_TARGET,
        event = "shutdown_requested",
        cause = %cause,
        "shutting down supervisor session"
    );
    let outcome = session.shutdown();
    drop(guard);
    outcome
}

#[cfg(target_os = "linux")]
fn guest_dialer(cid: Option<u32>) -> Result<Option<Arc<dyn GuestDialer>>, SupervisorError> {
    use bladerunner_tunnel::VsockDialer;

    Ok(cid.map(|cid| Arc::new(VsockDialer::new(cid)) as Arc<dyn GuestDialer>))
}

#[cfg(not(target_os = "linux"))]
fn guest_dialer(cid: Option<u32>) -> Result<Option<Arc<dyn GuestDialer>>, SupervisorError> {
    match cid {
        Some(_) => Err(SupervisorError::VsockUnsupported),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests;
