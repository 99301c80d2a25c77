//! Command routing for the control plane.
//!
//! A [`Router`] maps command names to handlers. Commands that do not match
//! exactly are split at the first `.`; if a sub-router is mounted under the
//! prefix, the remainder is dispatched there with the arguments untouched.
//! Namespaces nest, so `a.b.c` can reach a router mounted at `b` inside a
//! router mounted at `a`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::controller::Controller;
use crate::message::{CMD_PING, CMD_STATUS, CMD_STOP, Message, RESP_OK, RESP_PONG};
use crate::observer::{ControlObserver, TracingObserver};
use crate::request::Request;

/// Separator between a namespace and the command inside it.
pub const NAMESPACE_SEPARATOR: char = '.';

/// Handles one routed command.
pub trait Handler: Send + Sync {
    /// Produces the reply for `request`.
    fn handle(&self, request: &Request) -> Message;
}

impl<F> Handler for F
where
    F: Fn(&Request) -> Message + Send + Sync,
{
    fn handle(&self, request: &Request) -> Message {
        self(request)
    }
}

/// Dispatch table with namespaced sub-routers.
pub struct Router {
    handlers: HashMap<String, Arc<dyn Handler>>,
    mounts: HashMap<String, Arc<Router>>,
    observer: Arc<dyn ControlObserver>,
}

impl Router {
    /// Creates an empty router that reports through `tracing`.
    pub fn new() -> Self {
        Self::with_observer(Arc::new(TracingObserver))
    }

    /// Creates an empty router that reports to `observer`.
    pub fn with_observer(observer: Arc<dyn ControlObserver>) -> Self {
        Self {
            handlers: HashMap::new(),
            mounts: HashMap::new(),
            observer,
        }
    }

    /// Registers `handler` for the exact command `command`, replacing any
    /// previous handler.
    pub fn handle(&mut self, command: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(command.into(), Arc::new(handler));
    }

    /// Mounts `router` under `prefix`; `prefix.x` is dispatched to `x` on it.
    pub fn mount(&mut self, prefix: impl Into<String>, router: impl Into<Arc<Router>>) {
        self.mounts.insert(prefix.into(), router.into());
    }

    /// Installs `ping`, `status`, and `stop` backed by `controller`.
    pub fn register_controller(&mut self, controller: Arc<dyn Controller>) {
        let ping = Arc::clone(&controller);
        self.handle(CMD_PING, move |_: &Request| match ping.ping() {
            Ok(()) => Message::response(RESP_PONG),
            Err(error) => Message::error(error.to_string()),
        });
        let status = Arc::clone(&controller);
        self.handle(CMD_STATUS, move |_: &Request| match status.status() {
            Ok(state) => Message::response(state.as_str()),
            Err(error) => Message::error(error.to_string()),
        });
        self.handle(CMD_STOP, move |_: &Request| match controller.stop() {
            Ok(()) => Message::response(RESP_OK),
            Err(error) => Message::error(error.to_string()),
        });
    }

    /// Routes `request` to its handler.
    ///
    /// Never panics; an unroutable command yields an error reply naming the
    /// command exactly as the client sent it.
    pub fn dispatch(&self, request: &Request) -> Message {
        match self.route(request) {
            Some(reply) => reply,
            None => {
                self.observer.command_unknown(request.command());
                Message::error(format!("unknown command: {}", request.command()))
            }
        }
    }

    fn route(&self, request: &Request) -> Option<Message> {
        if let Some(handler) = self.handlers.get(request.command()) {
            self.observer.command_dispatched(request.command());
            return Some(handler.handle(request));
        }
        let (prefix, rest) = request.command().split_once(NAMESPACE_SEPARATOR)?;
        let router = self.mounts.get(prefix)?;
        router.route(&request.with_command(rest))
    }

    /// Lists every reachable command, fully qualified and sorted.
    pub fn commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.handlers.keys().cloned().collect();
        for (prefix, router) in &self.mounts {
            commands.extend(
                router
                    .commands()
                    .into_iter()
                    .map(|command| format!("{prefix}{NAMESPACE_SEPARATOR}{command}")),
            );
        }
        commands.sort();
        commands
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("commands", &self.commands())
            .finish_non_exhaustive()
    }
}
