use bladerunner_config::{SocketPreparationError, StatePathsError};
use bladerunner_control::{ConfigError, ListenerError};
use bladerunner_tunnel::ForwarderError;
use thiserror::Error;

use crate::shutdown::ShutdownError;
use crate::telemetry::TelemetryError;

/// Errors raised while running a supervisor session.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Command-line arguments were invalid.
    #[error("{0}")]
    Usage(#[from] clap::Error),
    /// Telemetry could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The state directory could not be prepared.
    #[error(transparent)]
    StatePaths(#[from] StatePathsError),
    /// The control socket directory could not be prepared.
    #[error(transparent)]
    SocketDirectory(#[from] SocketPreparationError),
    /// The control listener failed.
    #[error("control listener: {0}")]
    Listener(#[from] ListenerError),
    /// A port forwarder failed.
    #[error("port forwarding: {0}")]
    Forwarder(#[from] ForwarderError),
    /// Publishing a runtime value failed.
    #[error("runtime config: {0}")]
    Config(#[from] ConfigError),
    /// Signal handlers could not be installed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// Guest forwarding was requested on a platform without vsock support.
    #[error("guest port forwarding requires Linux vsock support")]
    VsockUnsupported,
}
