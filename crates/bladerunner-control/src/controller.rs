//! Liveness, status, and shutdown for a running VM.
//!
//! [`LocalController`] runs inside the supervisor and owns the shutdown
//! callback. The remote side of the same interface is
//! [`ControlClient`](crate::ControlClient), which proxies each call over the
//! control socket.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::errors::ControlError;

/// Coarse VM state reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    /// The supervisor is serving requests.
    Running,
    /// The supervisor has been asked to stop or is absent.
    Stopped,
}

impl VmStatus {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VmStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            other => Err(other.to_owned()),
        }
    }
}

/// Domain interface shared by the in-process and remote controllers.
pub trait Controller: Send + Sync {
    /// Succeeds when the VM supervisor is reachable.
    fn ping(&self) -> Result<(), ControlError>;

    /// Reports whether the VM is running.
    fn status(&self) -> Result<VmStatus, ControlError>;

    /// Requests a graceful shutdown. Repeated calls are harmless.
    fn stop(&self) -> Result<(), ControlError>;
}

impl<T> Controller for Arc<T>
where
    T: Controller + ?Sized,
{
    fn ping(&self) -> Result<(), ControlError> {
        (**self).ping()
    }

    fn status(&self) -> Result<VmStatus, ControlError> {
        (**self).status()
    }

    fn stop(&self) -> Result<(), ControlError> {
        (**self).stop()
    }
}

type StopCallback = Box<dyn FnOnce() + Send>;

struct LocalState {
    stopped: bool,
    on_stop: Option<StopCallback>,
}

/// In-process controller wrapping the supervisor's shutdown callback.
///
/// The callback runs at most once, no matter how many threads call
/// [`Controller::stop`]. It runs after the internal lock is released, so it
/// may safely query the controller.
pub struct LocalController {
    state: Mutex<LocalState>,
}

impl LocalController {
    /// Creates a controller that invokes `on_stop` on the first stop request.
    pub fn new(on_stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            state: Mutex::new(LocalState {
                stopped: false,
                on_stop: Some(Box::new(on_stop)),
            }),
        }
    }

    /// Creates a controller with no shutdown side effect.
    pub fn detached() -> Self {
        Self {
            state: Mutex::new(LocalState {
                stopped: false,
                on_stop: None,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LocalState>, ControlError> {
        self.state
            .lock()
            .map_err(|_| ControlError::poisoned("controller"))
    }
}

impl fmt::Debug for LocalController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stopped = self.state.lock().map(|state| state.stopped).ok();
        f.debug_struct("LocalController")
            .field("stopped", &stopped)
            .finish_non_exhaustive()
    }
}

impl Controller for LocalController {
    fn ping(&self) -> Result<(), ControlError> {
        Ok(())
    }

    fn status(&self) -> Result<VmStatus, ControlError> {
        let state = self.lock()?;
        Ok(if state.stopped {
            VmStatus::Stopped
        } else {
            VmStatus::Running
        })
    }

    fn stop(&self) -> Result<(), ControlError> {
        let callback = {
            let mut state = self.lock()?;
            if state.stopped {
                return Ok(());
            }
            state.stopped = true;
            state.on_stop.take()
        };
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }
}
