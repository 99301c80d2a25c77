//! Host TCP to guest virtual-socket port forwarding.
//!
//! Each accepted client is served on its own scoped thread: dial the guest
//! with a bounded retry budget, then relay bytes both ways until each side
//! reaches EOF. The accept thread owns the scope, so joining it is the wait
//! group for every relay.

mod relay;

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::dialer::GuestDialer;
use crate::errors::ForwarderError;
use crate::observer::ForwarderObserver;
use crate::stream::DuplexStream;

/// Guest dial attempts per accepted client.
pub const DIAL_ATTEMPTS: u32 = 30;
/// Pause between failed guest dial attempts.
pub const DIAL_RETRY_DELAY: Duration = Duration::from_millis(500);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Static description of one forwarded service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Label used in log events, for example `ssh`.
    pub name: String,
    /// Host address to listen on, for example `127.0.0.1:6022`.
    pub listen_addr: String,
    /// Guest virtual-socket port each client is bridged to.
    pub guest_port: u32,
    /// Dial attempts before a client is dropped.
    pub dial_attempts: u32,
    /// Pause between failed dial attempts.
    pub dial_retry_delay: Duration,
}

impl ForwarderConfig {
    /// Describes a forwarder with the default dial retry budget.
    pub fn new(name: impl Into<String>, listen_addr: impl Into<String>, guest_port: u32) -> Self {
        Self {
            name: name.into(),
            listen_addr: listen_addr.into(),
            guest_port,
            dial_attempts: DIAL_ATTEMPTS,
            dial_retry_delay: DIAL_RETRY_DELAY,
        }
    }

    /// Overrides the dial retry budget.
    #[must_use]
    pub fn with_dial_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.dial_attempts = attempts;
        self.dial_retry_delay = delay;
        self
    }
}

/// A running port forwarder.
///
/// Dropping the forwarder closes it and waits for its relays.
pub struct PortForwarder {
    name: String,
    local_addr: SocketAddr,
    guest_port: u32,
    cancel: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    observer: Arc<dyn ForwarderObserver>,
}

impl PortForwarder {
    /// Binds the host listener and starts accepting clients.
    ///
    /// # Errors
    ///
    /// Returns [`ForwarderError`] when the address cannot be bound or the
    /// accept thread cannot be started.
    pub fn start(
        config: ForwarderConfig,
        dialer: Arc<dyn GuestDialer>,
        observer: Arc<dyn ForwarderObserver>,
    ) -> Result<Self, ForwarderError> {
        let name = config.name.clone();
        let listener =
            TcpListener::bind(&config.listen_addr).map_err(|source| ForwarderError::Bind {
                name: name.clone(),
                address: config.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ForwarderError::LocalAddr {
                name: name.clone(),
                source,
            })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ForwarderError::NonBlocking {
                name: name.clone(),
                source,
            })?;

        let cancel = Arc::new(AtomicBool::new(false));
        let guest_port = config.guest_port;
        let accept = AcceptLoop {
            listener,
            local_addr,
            sessions: SessionContext {
                name: config.name,
                guest_port,
                dial_attempts: config.dial_attempts.max(1),
                dial_retry_delay: config.dial_retry_delay,
                dialer,
                observer: Arc::clone(&observer),
                cancel: Arc::clone(&cancel),
            },
        };
        let join = thread::Builder::new()
            .name(format!("forward-{name}"))
            .spawn(move || accept.run())
            .map_err(|source| ForwarderError::Spawn {
                name: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            local_addr,
            guest_port,
            cancel,
            join: Some(join),
            observer,
        })
    }

    /// The forwarder's label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound host address, useful when listening on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The guest port clients are bridged to.
    pub fn guest_port(&self) -> u32 {
        self.guest_port
    }

    /// Stops accepting, releases the listener, aborts pending dials, and
    /// waits until every relay has exited.
    ///
    /// # Errors
    ///
    /// Returns [`ForwarderError::ThreadPanic`] if the accept thread panicked.
    pub fn close(mut self) -> Result<(), ForwarderError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), ForwarderError> {
        self.cancel.store(true, Ordering::SeqCst);
        match self.join.take() {
            Some(handle) => handle.join().map_err(|_| ForwarderError::ThreadPanic {
                name: self.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for PortForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortForwarder")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("guest_port", &self.guest_port)
            .finish_non_exhaustive()
    }
}

impl Drop for PortForwarder {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            self.observer.close_failed(&self.name, &error);
        }
    }
}

struct AcceptLoop {
    listener: TcpListener,
    local_addr: SocketAddr,
    sessions: SessionContext,
}

impl AcceptLoop {
    fn run(self) {
        let Self {
            listener,
            local_addr,
            sessions,
        } = self;
        let sessions = &sessions;
        sessions
            .observer
            .started(&sessions.name, local_addr, sessions.guest_port);

        thread::scope(|scope| {
            let mut last_error = None::<ErrorKind>;
            while !sessions.cancelled() {
                match listener.accept() {
                    Ok((client, _peer)) => {
                        last_error = None;
                        let spawned = thread::Builder::new()
                            .name(format!("relay-{}", sessions.name))
                            .spawn_scoped(scope, move || sessions.serve(client));
                        if let Err(error) = spawned {
                            sessions.observer.accept_failed(&sessions.name, &error);
                        }
                    }
                    Err(error) if error.kind() == ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_BACKOFF);
                    }
                    Err(error) if error.kind() == ErrorKind::Interrupted => {}
                    Err(error) => {
                        let kind = error.kind();
                        if last_error != Some(kind) {
                            sessions.observer.accept_failed(&sessions.name, &error);
                        }
                        last_error = Some(kind);
                        thread::sleep(ERROR_BACKOFF);
                    }
                }
            }
            // Release the port before the scope waits on in-flight relays.
            drop(listener);
        });

        sessions.observer.stopped(&sessions.name, local_addr);
    }
}

struct SessionContext {
    name: String,
    guest_port: u32,
    dial_attempts: u32,
    dial_retry_delay: Duration,
    dialer: Arc<dyn GuestDialer>,
    observer: Arc<dyn ForwarderObserver>,
    cancel: Arc<AtomicBool>,
}

impl SessionContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn serve(&self, client: TcpStream) {
        if let Err(error) = client.set_nonblocking(false) {
            self.observer.accept_failed(&self.name, &error);
            return;
        }
        let Some(guest) = self.dial_with_retry() else {
            return;
        };
        let report = |error: &io::Error| self.observer.relay_failed(&self.name, error);
        if let Err(error) = relay::bridge(Box::new(client), guest, &self.cancel, &report) {
            report(&error);
        }
    }

    fn dial_with_retry(&self) -> Option<Box<dyn DuplexStream>> {
        let mut last_error = None;
        for attempt in 1..=self.dial_attempts {
            if self.cancelled() {
                return None;
            }
            match self.dialer.dial(self.guest_port) {
                Ok(stream) => {
                    self.observer
                        .dial_succeeded(&self.name, self.guest_port, attempt);
                    return Some(stream);
                }
                Err(error) => last_error = Some(error),
            }
            if attempt < self.dial_attempts && !self.pause(self.dial_retry_delay) {
                return None;
            }
        }
        if let Some(error) = last_error {
            self.observer
                .dial_exhausted(&self.name, self.guest_port, self.dial_attempts, &error);
        }
        None
    }

    /// Sleeps for `delay` in short slices; returns `false` if cancelled.
    fn pause(&self, delay: Duration) -> bool {
        let until = Instant::now() + delay;
        loop {
            if self.cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            thread::sleep(CANCEL_POLL.min(until - now));
        }
    }
}

#[cfg(test)]
mod tests;
