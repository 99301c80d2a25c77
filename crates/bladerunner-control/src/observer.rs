//! Structured event reporting for the control plane.
//!
//! Routers and listeners take an explicitly constructed observer instead of
//! logging through a process-wide sink, so tests can substitute a silent or
//! recording implementation.

use std::sync::Arc;

/// Tracing target for router events.
pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");
/// Tracing target for listener events.
pub(crate) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::listener");

/// Observer trait used to surface control-plane events to telemetry sinks.
pub trait ControlObserver: Send + Sync {
    /// Invoked once the listener's accept loop is running.
    fn listener_started(&self, address: &str);

    /// Invoked after the accept loop has released the listening socket.
    fn listener_stopped(&self, address: &str);

    /// Invoked when accepting a connection fails.
    fn accept_failed(&self, error: &std::io::Error);

    /// Invoked when the socket artefact could not be removed on shutdown.
    fn cleanup_failed(&self, address: &str, error: &std::io::Error);

    /// Invoked when a connection fails before a reply could be written.
    fn connection_failed(&self, error: &dyn std::error::Error);

    /// Invoked when a command reaches a handler.
    fn command_dispatched(&self, command: &str);

    /// Invoked when no handler matches a command.
    fn command_unknown(&self, command: &str);
}

impl<T> ControlObserver for Arc<T>
where
    T: ControlObserver + ?Sized,
{
    fn listener_started(&self, address: &str) {
        (**self).listener_started(address);
    }

    fn listener_stopped(&self, address: &str) {
        (**self).listener_stopped(address);
    }

    fn accept_failed(&self, error: &std::io::Error) {
        (**self).accept_failed(error);
    }

    fn cleanup_failed(&self, address: &str, error: &std::io::Error) {
        (**self).cleanup_failed(address, error);
    }

    fn connection_failed(&self, error: &dyn std::error::Error) {
        (**self).connection_failed(error);
    }

    fn command_dispatched(&self, command: &str) {
        (**self).command_dispatched(command);
    }

    fn command_unknown(&self, command: &str) {
        (**self).command_unknown(command);
    }
}

/// Default observer that records events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ControlObserver for TracingObserver {
    fn listener_started(&self, address: &str) {
        tracing::info!(
            target: LISTENER_TARGET,
            event = "listener_started",
            address,
            "control listener active"
        );
    }

    fn listener_stopped(&self, address: &str) {
        tracing::info!(
            target: LISTENER_TARGET,
            event = "listener_stopped",
            address,
            "control listener stopped"
        );
    }

    fn accept_failed(&self, error: &std::io::Error) {
        tracing::warn!(
            target: LISTENER_TARGET,
            event = "accept_failed",
            error = %error,
            "control accept error"
        );
    }

    fn cleanup_failed(&self, address: &str, error: &std::io::Error) {
        tracing::warn!(
            target: LISTENER_TARGET,
            event = "cleanup_failed",
            address,
            error = %error,
            "failed to remove control socket"
        );
    }

    fn connection_failed(&self, error: &dyn std::error::Error) {
        tracing::warn!(
            target: LISTENER_TARGET,
            event = "connection_failed",
            error = %error,
            "control connection error"
        );
    }

    fn command_dispatched(&self, command: &str) {
        tracing::debug!(
            target: ROUTER_TARGET,
            event = "command_dispatched",
            command,
            "dispatching control command"
        );
    }

    fn command_unknown(&self, command: &str) {
        tracing::debug!(
            target: ROUTER_TARGET,
            event = "command_unknown",
            command,
            "unknown control command"
        );
    }
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ControlObserver for NoopObserver {
    fn listener_started(&self, _address: &str) {}
    fn listener_stopped(&self, _address: &str) {}
    fn accept_failed(&self, _error: &std::io::Error) {}
    fn cleanup_failed(&self, _address: &str, _error: &std::io::Error) {}
    fn connection_failed(&self, _error: &dyn std::error::Error) {}
    fn command_dispatched(&self, _command: &str) {}
    fn command_unknown(&self, _command: &str) {}
}
