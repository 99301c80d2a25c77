//! Error types for control operations.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::wire::WireError;

/// Errors surfaced by controllers and the control client.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No supervisor is listening on the control endpoint.
    #[error("VM is not running")]
    NotRunning,
    /// The control endpoint exists but could not be reached.
    #[error("failed to connect to control socket {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    /// A request or reply could not be exchanged.
    #[error("control exchange for `{command}` failed: {source}")]
    Exchange {
        command: String,
        #[source]
        source: WireError,
    },
    /// The supervisor answered with an error reply.
    #[error("{message}")]
    Server { message: String },
    /// The supervisor answered with something the caller did not expect.
    #[error("unexpected response to `{command}`: {response}")]
    UnexpectedResponse { command: String, response: String },
    /// A config request was refused before it was sent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Shared state was left inconsistent by a panicking thread.
    #[error("controller state is unavailable: {reason}")]
    Internal { reason: String },
}

impl ControlError {
    /// Builds an internal error for a poisoned lock.
    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Internal {
            reason: format!("{what} lock poisoned"),
        }
    }
}
