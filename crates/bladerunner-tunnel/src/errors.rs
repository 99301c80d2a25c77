use std::io;

use thiserror::Error;

/// Errors surfaced while starting or stopping a port forwarder.
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// Binding the host-side listening socket failed.
    #[error("{name}: failed to listen on {address}: {source}")]
    Bind {
        /// Forwarder name.
        name: String,
        /// Requested listen address.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Querying the bound address failed.
    #[error("{name}: failed to read bound address: {source}")]
    LocalAddr {
        /// Forwarder name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Configuring the listener for polling failed.
    #[error("{name}: failed to configure non-blocking accept: {source}")]
    NonBlocking {
        /// Forwarder name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Spawning the accept thread failed.
    #[error("{name}: failed to spawn forwarder thread: {source}")]
    Spawn {
        /// Forwarder name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked before it drained its relays.
    #[error("{name}: forwarder thread panicked")]
    ThreadPanic {
        /// Forwarder name.
        name: String,
    },
}
