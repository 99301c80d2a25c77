//! Shared configuration for the Bladerunner supervisor and CLI.
//!
//! The crate owns the values both binaries must agree on: where the
//! per-instance state directory lives, how the control socket endpoint is
//! expressed, the logging format, and the live [`RuntimeConfig`] the
//! supervisor exposes over its control plane.

mod defaults;
mod logging;
mod paths;
mod runtime;
mod socket;

pub use defaults::{
    CONTROL_SOCKET_NAME, DEFAULT_CPUS, DEFAULT_DISK_SIZE_GIB, DEFAULT_LOCAL_API_PORT,
    DEFAULT_LOCAL_SSH_PORT, DEFAULT_LOG_FILTER, DEFAULT_MEMORY_GIB, DEFAULT_NAME,
    DEFAULT_NETWORK_MODE, DEFAULT_SSH_USER, DEFAULT_VSOCK_API_PORT, DEFAULT_VSOCK_SSH_PORT,
    default_base_image_url, default_log_filter, default_log_format, default_state_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{StatePaths, StatePathsError};
pub use runtime::RuntimeConfig;
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};
