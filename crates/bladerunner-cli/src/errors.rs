//! Errors reported by `br`.

use std::io;
use std::time::Duration;

use bladerunner_control::{ConfigError, ControlError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    /// Control failures already read as one line, e.g. `VM is not running`.
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("supervisor at {address} did not shut down within {}s", timeout.as_secs())]
    ShutdownTimeout { address: String, timeout: Duration },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
