//! Control socket listener.
//!
//! The listener binds a transport address, accepts connections on a
//! background thread, and serves each connection on its own thread: decode
//! one request, dispatch it through the [`Router`], encode one reply, close.
//!
//! The accept loop polls a non-blocking socket and exits only by dropping
//! it. [`ListenerHandle::close`] returns once the socket has been released
//! and its filesystem artefact removed.

mod errors;
mod handler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bladerunner_config::SocketEndpoint;

use self::handler::ConnectionContext;
use crate::controller::Controller;
use crate::observer::{ControlObserver, TracingObserver};
use crate::router::{Handler, Router};
use crate::transport::{Transport, TransportListener, is_unavailable, transport_for};
use crate::wire::{LineFormat, WireFormat};

pub use self::errors::ListenerError;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// How long to wait for an existing supervisor to answer before treating its
/// socket as stale.
pub const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_millis(100);
/// Absolute budget for one request/reply exchange.
pub const CONNECTION_DEADLINE: Duration = Duration::from_secs(5);

/// Tunables for a [`ControlListener`].
#[derive(Clone)]
pub struct ListenerOptions {
    /// Codec used for every connection.
    pub wire: Arc<dyn WireFormat>,
    /// Event sink shared by the listener and its router.
    pub observer: Arc<dyn ControlObserver>,
    /// Absolute deadline for each connection.
    pub deadline: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            wire: Arc::new(LineFormat),
            observer: Arc::new(TracingObserver),
            deadline: CONNECTION_DEADLINE,
        }
    }
}

impl std::fmt::Debug for ListenerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerOptions")
            .field("wire", &self.wire)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// A bound, not yet started, control listener.
pub struct ControlListener {
    transport: Arc<dyn Transport>,
    address: String,
    listener: TransportListener,
    router: Router,
    options: ListenerOptions,
}

impl ControlListener {
    /// Binds the endpoint with the transport that matches it.
    ///
    /// # Errors
    ///
    /// See [`ControlListener::bind`].
    pub fn bind_endpoint(
        endpoint: &SocketEndpoint,
        options: ListenerOptions,
    ) -> Result<Self, ListenerError> {
        Self::bind(transport_for(endpoint), endpoint.address(), options)
    }

    /// Binds `address` on `transport`.
    ///
    /// An address that already answers belongs to a live supervisor and is
    /// left alone. An unresponsive leftover is removed before binding.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::AlreadyRunning`] when another process answers
    /// on the address, and a bind or cleanup error otherwise.
    pub fn bind(
        transport: Arc<dyn Transport>,
        address: impl Into<String>,
        options: ListenerOptions,
    ) -> Result<Self, ListenerError> {
        let address = address.into();
        match transport.dial(&address, LIVENESS_PROBE_TIMEOUT) {
            Ok(_connection) => return Err(ListenerError::AlreadyRunning { address }),
            Err(error) if is_unavailable(&error) => {
                transport
                    .cleanup(&address)
                    .map_err(|source| ListenerError::StaleCleanup {
                        address: address.clone(),
                        source,
                    })?;
            }
            Err(source) => return Err(ListenerError::Probe { address, source }),
        }
        let listener = transport.listen(&address)?;
        Ok(Self {
            transport,
            address,
            listener,
            router: Router::with_observer(Arc::clone(&options.observer)),
            options,
        })
    }

    /// The address the listener was bound with.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The concrete TCP address, useful when binding port 0.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The router that will serve requests.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Registers a handler for `command`.
    pub fn handle(&mut self, command: impl Into<String>, handler: impl Handler + 'static) {
        self.router.handle(command, handler);
    }

    /// Mounts `router` under `prefix`.
    pub fn mount(&mut self, prefix: impl Into<String>, router: impl Into<Arc<Router>>) {
        self.router.mount(prefix, router);
    }

    /// Installs `ping`, `status`, and `stop`.
    pub fn register_controller(&mut self, controller: Arc<dyn Controller>) {
        self.router.register_controller(controller);
    }

    /// Starts the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be switched to non-blocking mode or the
    /// thread cannot be spawned; the socket artefact is removed in both cases.
    pub fn start(self) -> Result<ListenerHandle, ListenerError> {
        let Self {
            transport,
            address,
            listener,
            router,
            options,
        } = self;
        if let Err(source) = listener.set_nonblocking(true) {
            drop(listener);
            release(transport.as_ref(), &address, options.observer.as_ref());
            return Err(ListenerError::NonBlocking { source });
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let context = Arc::new(ConnectionContext {
            router: Arc::new(router),
            wire: options.wire,
            observer: Arc::clone(&options.observer),
            deadline: options.deadline,
        });
        let accept = AcceptLoop {
            transport: Arc::clone(&transport),
            address: address.clone(),
            listener,
            context,
            shutdown: Arc::clone(&shutdown),
        };
        let join = thread::Builder::new()
            .name("control-accept".to_owned())
            .spawn(move || accept.run())
            .map_err(|source| {
                release(transport.as_ref(), &address, options.observer.as_ref());
                ListenerError::Spawn { source }
            })?;
        Ok(ListenerHandle {
            address,
            shutdown,
            join: Some(join),
        })
    }
}

impl std::fmt::Debug for ControlListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlListener")
            .field("transport", &self.transport.name())
            .field("address", &self.address)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Handle to a running listener.
///
/// Dropping the handle requests shutdown without waiting for it.
#[derive(Debug)]
pub struct ListenerHandle {
    address: String,
    shutdown: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// The address the listener is serving.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Asks the accept loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to release the socket.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the accept thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.join.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }

    /// Stops accepting, releases the socket, and removes its artefact.
    ///
    /// In-flight connections finish on their own threads.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the accept thread panicked.
    pub fn close(self) -> Result<(), ListenerError> {
        self.shutdown();
        self.join()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

struct AcceptLoop {
    transport: Arc<dyn Transport>,
    address: String,
    listener: TransportListener,
    context: Arc<ConnectionContext>,
    shutdown: Arc<AtomicBool>,
}

impl AcceptLoop {
    fn run(self) {
        let observer = Arc::clone(&self.context.observer);
        observer.listener_started(&self.address);
        let mut last_error = None::<std::io::ErrorKind>;
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok(Some(connection)) => {
                    last_error = None;
                    let context = Arc::clone(&self.context);
                    let spawned = thread::Builder::new()
                        .name("control-conn".to_owned())
                        .spawn(move || context.serve(connection));
                    if let Err(error) = spawned {
                        observer.accept_failed(&error);
                    }
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        observer.accept_failed(&error);
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        let Self {
            transport,
            address,
            listener,
            ..
        } = self;
        drop(listener);
        release(transport.as_ref(), &address, observer.as_ref());
        observer.listener_stopped(&address);
    }
}

fn release(transport: &dyn Transport, address: &str, observer: &dyn ControlObserver) {
    if let Err(error) = transport.cleanup(address) {
        observer.cleanup_failed(address, &error);
    }
}

#[cfg(test)]
mod tests;
