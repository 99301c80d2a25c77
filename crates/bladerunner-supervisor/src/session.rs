//! One supervised VM session.
//!
//! A [`Session`] owns the control listener, the live runtime config, and the
//! guest port forwarders. It is started once, waits for the first shutdown
//! request, and tears everything down in reverse dependency order: the
//! forwarders drain before the control socket is released, so a client that
//! sees the socket disappear knows no tunnel is still running.

use std::sync::Arc;

use bladerunner_config::{RuntimeConfig, SocketEndpoint, StatePaths};
use bladerunner_control::{
    CONFIG_NAMESPACE, ConfigRouter, ControlListener, ControlObserver, ListenerHandle,
    ListenerOptions, LocalController, TracingObserver, WireFormatKind,
};
use bladerunner_tunnel::{
    ForwarderConfig, ForwarderObserver, GuestDialer, PortForwarder, TracingForwarderObserver,
};

use crate::SUPERVISOR_TARGET;
use crate::errors::SupervisorError;
use crate::shutdown::{ShutdownCause, ShutdownNotifier, ShutdownReceiver, shutdown_channel};

/// Everything needed to start a [`Session`].
#[derive(Clone)]
pub struct SessionOptions {
    /// Control socket endpoint.
    pub endpoint: SocketEndpoint,
    /// Control protocol framing.
    pub wire: WireFormatKind,
    /// Initial runtime configuration; its state directory is created.
    pub runtime: RuntimeConfig,
    /// Guest dialer; forwarders are only started when one is supplied.
    pub dialer: Option<Arc<dyn GuestDialer>>,
    /// Event sink for the control plane.
    pub control_observer: Arc<dyn ControlObserver>,
    /// Event sink for the forwarders.
    pub forwarder_observer: Arc<dyn ForwarderObserver>,
}

impl SessionOptions {
    /// Options with tracing observers and no guest forwarding.
    pub fn new(endpoint: SocketEndpoint, runtime: RuntimeConfig) -> Self {
        Self {
            endpoint,
            wire: WireFormatKind::default(),
            runtime,
            dialer: None,
            control_observer: Arc::new(TracingObserver),
            forwarder_observer: Arc::new(TracingForwarderObserver),
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("endpoint", &self.endpoint)
            .field("wire", &self.wire)
            .field("forwarding", &self.dialer.is_some())
            .finish_non_exhaustive()
    }
}

/// A running supervisor session.
#[derive(Debug)]
pub struct Session {
    paths: StatePaths,
    config: ConfigRouter,
    control_address: String,
    listener: Option<ListenerHandle>,
    forwarders: Vec<PortForwarder>,
    notifier: ShutdownNotifier,
    shutdown: ShutdownReceiver,
}

impl Session {
    /// Prepares the state directory, serves the control socket, starts the
    /// guest forwarders, and publishes the supervisor pid.
    ///
    /// # Errors
    ///
    /// Fails when any of those steps fails; everything started so far is
    /// torn down before the error is returned.
    pub fn start(options: SessionOptions) -> Result<Self, SupervisorError> {
        let SessionOptions {
            endpoint,
            wire,
            runtime,
            dialer,
            control_observer,
            forwarder_observer,
        } = options;
        let paths = StatePaths::prepare(&runtime.state_dir)?;
        endpoint.prepare_filesystem()?;

        let (notifier, shutdown) = shutdown_channel();
        let plans = forwarder_plans(&runtime);
        let config = ConfigRouter::from_config(runtime);

        let mut listener = ControlListener::bind_endpoint(
            &endpoint,
            ListenerOptions {
                wire: wire.format(),
                observer: Arc::clone(&control_observer),
                ..ListenerOptions::default()
            },
        )?;
        let stop_notifier = notifier.clone();
        listener.register_controller(Arc::new(LocalController::new(move || {
            stop_notifier.notify(ShutdownCause::StopCommand);
        })));
        listener.mount(CONFIG_NAMESPACE, config.router(control_observer));
        let listener = listener.start()?;

        let forwarders = match dialer {
            Some(dialer) => match start_forwarders(plans, &dialer, &forwarder_observer) {
                Ok(forwarders) => forwarders,
                Err(error) => {
                    if let Err(close_error) = listener.close() {
                        tracing::warn!(
                            target: SUPERVISOR_TARGET,
                            event = "listener_close_failed",
                            error = %close_error,
                            "control listener did not close after forwarder start failed"
                        );
                    }
                    return Err(error);
                }
            },
            None => Vec::new(),
        };

        let session = Self {
            paths,
            config,
            control_address: listener.address().to_owned(),
            listener: Some(listener),
            forwarders,
            notifier,
            shutdown,
        };
        let pid = std::process::id();
        // Dropping the session on error tears down what was started.
        session.config.update(|config| config.pid = Some(pid))?;
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "session_started",
            control = %session.control_address,
            state_dir = %session.paths.state_dir(),
            forwarders = session.forwarders.len(),
            pid,
            "supervisor session started"
        );
        Ok(session)
    }

    /// The live runtime configuration served under `config.*`.
    pub fn config(&self) -> &ConfigRouter {
        &self.config
    }

    /// Derived state paths.
    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    /// The address the control listener serves.
    pub fn control_address(&self) -> &str {
        &self.control_address
    }

    /// Running forwarders in start order.
    pub fn forwarders(&self) -> &[PortForwarder] {
        &self.forwarders
    }

    /// A handle that requests shutdown, for signal listeners.
    pub fn notifier(&self) -> ShutdownNotifier {
        self.notifier.clone()
    }

    /// Blocks until the first shutdown request.
    pub fn wait(&self) -> ShutdownCause {
        self.shutdown.wait()
    }

    /// Closes the forwarders, then the control listener.
    ///
    /// # Errors
    ///
    /// Reports the first teardown failure after attempting every step.
    pub fn shutdown(mut self) -> Result<(), SupervisorError> {
        let outcome = self.teardown();
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "session_stopped",
            "supervisor session stopped"
        );
        outcome
    }

    fn teardown(&mut self) -> Result<(), SupervisorError> {
        let mut first_error = None;
        for forwarder in self.forwarders.drain(..) {
            if let Err(error) = forwarder.close() {
                first_error.get_or_insert(SupervisorError::from(error));
            }
        }
        if let Some(listener) = self.listener.take() {
            if let Err(error) = listener.close() {
                first_error.get_or_insert(SupervisorError::from(error));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(error) = self.teardown() {
            tracing::warn!(
                target: SUPERVISOR_TARGET,
                event = "teardown_failed",
                error = %error,
                "supervisor session did not tear down cleanly"
            );
        }
    }
}

fn forwarder_plans(runtime: &RuntimeConfig) -> [ForwarderConfig; 2] {
    [
        ForwarderConfig::new(
            "ssh",
            format!("127.0.0.1:{}", runtime.local_ssh_port),
            runtime.vsock_ssh_port,
        ),
        ForwarderConfig::new(
            "api",
            format!("127.0.0.1:{}", runtime.local_api_port),
            runtime.vsock_api_port,
        ),
    ]
}

fn start_forwarders(
    plans: [ForwarderConfig; 2],
    dialer: &Arc<dyn GuestDialer>,
    observer: &Arc<dyn ForwarderObserver>,
) -> Result<Vec<PortForwarder>, SupervisorError> {
    let mut started = Vec::with_capacity(plans.len());
    for plan in plans {
        // Forwarders already running are closed on drop.
        started.push(PortForwarder::start(
            plan,
            Arc::clone(dialer),
            Arc::clone(observer),
        )?);
    }
    Ok(started)
}
