//! Guest tunnel for the Bladerunner supervisor.
//!
//! A [`PortForwarder`] listens on a host TCP address and bridges every
//! accepted client to a fixed guest virtual-socket port through a
//! [`GuestDialer`]. Guest dials are retried to absorb boot latency; relays
//! are opaque byte copies with half-close propagation.
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use bladerunner_tunnel::{
//!     ForwarderConfig, PortForwarder, TracingForwarderObserver, VsockDialer,
//! };
//!
//! let forwarder = PortForwarder::start(
//!     ForwarderConfig::new("ssh", "127.0.0.1:6022", 10022),
//!     Arc::new(VsockDialer::new(3)),
//!     Arc::new(TracingForwarderObserver),
//! )?;
//! forwarder.close()?;
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

mod dialer;
mod errors;
mod forwarder;
mod observer;
mod stream;

#[cfg(target_os = "linux")]
pub use dialer::VsockDialer;
pub use dialer::GuestDialer;
pub use errors::ForwarderError;
pub use forwarder::{DIAL_ATTEMPTS, DIAL_RETRY_DELAY, ForwarderConfig, PortForwarder};
pub use observer::{ForwarderObserver, NoopForwarderObserver, TracingForwarderObserver};
pub use stream::DuplexStream;

#[cfg(test)]
mod tests;
