//! Local control plane for the Bladerunner VM supervisor.
//!
//! A long-running supervisor binds a [`ControlListener`] on a socket inside
//! its state directory. Short-lived CLI processes use a [`ControlClient`] to
//! check liveness, read or change runtime configuration, and request a
//! graceful shutdown, without any other daemon-management machinery.
//!
//! The moving parts are deliberately small and swappable:
//!
//! - [`Transport`] decides how connections are made (Unix socket or TCP).
//! - [`WireFormat`] decides how a [`Message`] is framed (text line or JSON).
//! - [`Router`] maps command names to handlers and supports namespaces, which
//!   is how the [`ConfigRouter`] is served under `config.`.
//! - [`Controller`] is the domain interface; [`LocalController`] implements it
//!   in-process and [`ControlClient`] implements it over the wire.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bladerunner_config::SocketEndpoint;
//! use bladerunner_control::{ControlListener, ListenerOptions, LocalController};
//!
//! # fn main() -> Result<(), bladerunner_control::ListenerError> {
//! let endpoint = SocketEndpoint::unix("/tmp/bladerunner/control.sock");
//! let mut listener = ControlListener::bind_endpoint(&endpoint, ListenerOptions::default())?;
//! listener.register_controller(Arc::new(LocalController::new(|| println!("stopping"))));
//! let handle = listener.start()?;
//! handle.close()?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod controller;
mod errors;
mod listener;
mod message;
mod observer;
mod request;
mod router;
pub mod transport;
pub mod wire;

pub use client::{COMMAND_TIMEOUT, ClientConfig, ControlClient, DIAL_TIMEOUT, QUERY_TIMEOUT};
pub use config::{CONFIG_NAMESPACE, ConfigError, ConfigKeyMeta, ConfigRouter, SharedConfig};
pub use controller::{Controller, LocalController, VmStatus};
pub use errors::ControlError;
pub use listener::{
    CONNECTION_DEADLINE, ControlListener, LIVENESS_PROBE_TIMEOUT, ListenerError, ListenerHandle,
    ListenerOptions,
};
pub use message::{
    CMD_CONFIG_GET, CMD_CONFIG_KEYS, CMD_CONFIG_SET, CMD_PING, CMD_STATUS, CMD_STOP, Message,
    PROTOCOL_VERSION, RESP_OK, RESP_PONG,
};
pub use observer::{ControlObserver, NoopObserver, TracingObserver};
pub use request::Request;
pub use router::{Handler, NAMESPACE_SEPARATOR, Router};
pub use transport::{Transport, TransportError};
pub use wire::{JsonFormat, LineFormat, WireError, WireFormat, WireFormatKind};

#[cfg(test)]
mod tests;
