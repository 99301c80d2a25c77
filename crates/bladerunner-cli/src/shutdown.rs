//! Waiting for a supervisor to finish shutting down after `stop`.

use std::thread;
use std::time::{Duration, Instant};

use bladerunner_config::SocketEndpoint;
use bladerunner_control::ControlClient;

use crate::errors::AppError;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Polls until the supervisor no longer answers and its socket file is gone.
///
/// The supervisor acknowledges `stop` before it tears anything down, so the
/// acknowledgement alone does not mean the VM has exited.
///
/// # Errors
///
/// Returns [`AppError::ShutdownTimeout`] when either condition still holds
/// at the deadline.
pub(crate) fn wait_for_shutdown(
    client: &ControlClient,
    endpoint: &SocketEndpoint,
    timeout: Duration,
) -> Result<(), AppError> {
    let deadline = Instant::now() + timeout;
    loop {
        let socket_present = endpoint.unix_path().is_some_and(|path| path.exists());
        if !socket_present && !client.is_running() {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(AppError::ShutdownTimeout {
                address: endpoint.address(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
