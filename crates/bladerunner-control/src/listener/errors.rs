//! Error types for control listener operations.

use std::io;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced while binding or running the control listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("another supervisor is already listening on {address}")]
    AlreadyRunning { address: String },
    #[error("failed to probe existing control socket {address}: {source}")]
    Probe {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove stale control socket {address}: {source}")]
    StaleCleanup {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}
