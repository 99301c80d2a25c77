//! Shutdown requests from the control plane and from the operating system.
//!
//! Every source feeds one channel. The session blocks on the receiving end,
//! so whichever request arrives first decides when teardown starts.

use std::fmt;
use std::io;
use std::sync::mpsc;
use std::thread;

use thiserror::Error;

use crate::SUPERVISOR_TARGET;

/// Why the supervisor is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A control client sent `stop`.
    StopCommand,
    /// The process received a termination signal.
    Signal(i32),
    /// Every shutdown source went away.
    Disconnected,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopCommand => f.write_str("stop command"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::Disconnected => f.write_str("shutdown sources disconnected"),
        }
    }
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Sending half of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownNotifier {
    sender: mpsc::Sender<ShutdownCause>,
}

impl ShutdownNotifier {
    /// Requests shutdown. Requests after the first are ignored by the session.
    pub fn notify(&self, cause: ShutdownCause) {
        // The receiver only disappears once teardown has begun.
        let _ = self.sender.send(cause);
    }
}

/// Receiving half of the shutdown channel.
#[derive(Debug)]
pub struct ShutdownReceiver {
    receiver: mpsc::Receiver<ShutdownCause>,
}

impl ShutdownReceiver {
    /// Blocks until the first shutdown request arrives.
    pub fn wait(&self) -> ShutdownCause {
        self.receiver.recv().unwrap_or(ShutdownCause::Disconnected)
    }
}

/// Creates a connected notifier and receiver.
pub fn shutdown_channel() -> (ShutdownNotifier, ShutdownReceiver) {
    let (sender, receiver) = mpsc::channel();
    (ShutdownNotifier { sender }, ShutdownReceiver { receiver })
}

/// Abstraction over external shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Starts forwarding external requests to `notifier` until the returned
    /// guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when the listener cannot be set up.
    fn install(&self, notifier: ShutdownNotifier) -> Result<SignalGuard, ShutdownError>;
}

/// Keeps a signal listener alive; dropping it stops the listener.
#[derive(Default)]
pub struct SignalGuard {
    close: Option<Box<dyn FnOnce() + Send>>,
    join: Option<thread::JoinHandle<()>>,
}

impl SignalGuard {
    /// A guard with nothing to stop.
    pub fn inert() -> Self {
        Self::default()
    }

    fn new(close: impl FnOnce() + Send + 'static, join: thread::JoinHandle<()>) -> Self {
        Self {
            close: Some(Box::new(close)),
            join: Some(join),
        }
    }
}

impl fmt::Debug for SignalGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalGuard")
            .field("active", &self.join.is_some())
            .finish()
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Forwards `SIGTERM`, `SIGINT`, `SIGQUIT` and `SIGHUP` as shutdown requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

#[cfg(unix)]
impl ShutdownSignal for SystemShutdownSignal {
    fn install(&self, notifier: ShutdownNotifier) -> Result<SignalGuard, ShutdownError> {
        use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let join = thread::Builder::new()
            .name("signals".to_owned())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    tracing::info!(
                        target: SUPERVISOR_TARGET,
                        event = "signal_received",
                        signal,
                        "shutdown signal received"
                    );
                    notifier.notify(ShutdownCause::Signal(signal));
                }
            })
            .map_err(|source| ShutdownError::Install { source })?;
        Ok(SignalGuard::new(move || handle.close(), join))
    }
}

#[cfg(not(unix))]
impl ShutdownSignal for SystemShutdownSignal {
    fn install(&self, _notifier: ShutdownNotifier) -> Result<SignalGuard, ShutdownError> {
        Ok(SignalGuard::inert())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_wins() {
        let (notifier, receiver) = shutdown_channel();
        notifier.notify(ShutdownCause::Signal(15));
        notifier.notify(ShutdownCause::StopCommand);
        assert_eq!(receiver.wait(), ShutdownCause::Signal(15));
    }

    #[test]
    fn dropped_notifiers_release_the_waiter() {
        let (notifier, receiver) = shutdown_channel();
        drop(notifier);
        assert_eq!(receiver.wait(), ShutdownCause::Disconnected);
    }

    #[cfg(unix)]
    #[test]
    fn system_listener_stops_when_guard_drops() {
        let (notifier, receiver) = shutdown_channel();
        let guard = SystemShutdownSignal
            .install(notifier)
            .expect("install signal listener");
        drop(guard);
        assert_eq!(receiver.wait(), ShutdownCause::Disconnected);
    }
}
