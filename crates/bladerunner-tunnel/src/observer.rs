//! Structured event reporting for port forwarders.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::errors::ForwarderError;

const FORWARDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::forwarder");

/// Observer trait used to surface forwarder events to telemetry sinks.
pub trait ForwarderObserver: Send + Sync {
    /// The listening socket is bound and accepting.
    fn started(&self, name: &str, listen: SocketAddr, guest_port: u32);

    /// The forwarder has released its socket and drained every relay.
    fn stopped(&self, name: &str, listen: SocketAddr);

    /// Accepting a client failed.
    fn accept_failed(&self, name: &str, error: &io::Error);

    /// The guest was reached after `attempts` tries.
    fn dial_succeeded(&self, name: &str, guest_port: u32, attempts: u32);

    /// Every dial attempt failed; the client connection is dropped.
    fn dial_exhausted(&self, name: &str, guest_port: u32, attempts: u32, error: &io::Error);

    /// A relay direction failed and both sides were torn down.
    fn relay_failed(&self, name: &str, error: &io::Error);

    /// A forwarder dropped without `close` failed to shut down cleanly.
    fn close_failed(&self, name: &str, error: &ForwarderError);
}

impl<T> ForwarderObserver for Arc<T>
where
    T: ForwarderObserver + ?Sized,
{
    fn started(&self, name: &str, listen: SocketAddr, guest_port: u32) {
        (**self).started(name, listen, guest_port);
    }

    fn stopped(&self, name: &str, listen: SocketAddr) {
        (**self).stopped(name, listen);
    }

    fn accept_failed(&self, name: &str, error: &io::Error) {
        (**self).accept_failed(name, error);
    }

    fn dial_succeeded(&self, name: &str, guest_port: u32, attempts: u32) {
        (**self).dial_succeeded(name, guest_port, attempts);
    }

    fn dial_exhausted(&self, name: &str, guest_port: u32, attempts: u32, error: &io::Error) {
        (**self).dial_exhausted(name, guest_port, attempts, error);
    }

    fn relay_failed(&self, name: &str, error: &io::Error) {
        (**self).relay_failed(name, error);
    }

    fn close_failed(&self, name: &str, error: &ForwarderError) {
        (**self).close_failed(name, error);
    }
}

/// Default observer that records forwarder events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingForwarderObserver;

impl ForwarderObserver for TracingForwarderObserver {
    fn started(&self, name: &str, listen: SocketAddr, guest_port: u32) {
        tracing::info!(
            target: FORWARDER_TARGET,
            event = "forwarder_started",
            name,
            listen = %listen,
            guest_vsock_port = guest_port,
            "started port forwarder"
        );
    }

    fn stopped(&self, name: &str, listen: SocketAddr) {
        tracing::info!(
            target: FORWARDER_TARGET,
            event = "forwarder_stopped",
            name,
            listen = %listen,
            "stopped port forwarder"
        );
    }

    fn accept_failed(&self, name: &str, error: &io::Error) {
        tracing::debug!(
            target: FORWARDER_TARGET,
            event = "accept_failed",
            name,
            error = %error,
            "accept error"
        );
    }

    fn dial_succeeded(&self, name: &str, guest_port: u32, attempts: u32) {
        if attempts > 1 {
            tracing::debug!(
                target: FORWARDER_TARGET,
                event = "dial_succeeded",
                name,
                guest_vsock_port = guest_port,
                attempts,
                "vsock dial succeeded after retries"
            );
        }
    }

    fn dial_exhausted(&self, name: &str, guest_port: u32, attempts: u32, error: &io::Error) {
        tracing::warn!(
            target: FORWARDER_TARGET,
            event = "dial_exhausted",
            name,
            guest_vsock_port = guest_port,
            attempts,
            error = %error,
            "forward dial failed after retries"
        );
    }

    fn relay_failed(&self, name: &str, error: &io::Error) {
        tracing::debug!(
            target: FORWARDER_TARGET,
            event = "relay_failed",
            name,
            error = %error,
            "relay error"
        );
    }

    fn close_failed(&self, name: &str, error: &ForwarderError) {
        tracing::warn!(
            target: FORWARDER_TARGET,
            event = "close_failed",
            name,
            error = %error,
            "port forwarder did not shut down cleanly"
        );
    }
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopForwarderObserver;

impl ForwarderObserver for NoopForwarderObserver {
    fn started(&self, _name: &str, _listen: SocketAddr, _guest_port: u32) {}
    fn stopped(&self, _name: &str, _listen: SocketAddr) {}
    fn accept_failed(&self, _name: &str, _error: &io::Error) {}
    fn dial_succeeded(&self, _name: &str, _guest_port: u32, _attempts: u32) {}
    fn dial_exhausted(&self, _name: &str, _guest_port: u32, _attempts: u32, _error: &io::Error) {}
    fn relay_failed(&self, _name: &str, _error: &io::Error) {}
    fn close_failed(&self, _name: &str, _error: &ForwarderError) {}
}
