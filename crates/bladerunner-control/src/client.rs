//! Remote controller used by short-lived CLI processes.
//!
//! Every call opens a fresh connection, sends one command, reads one reply,
//! and closes. A socket that is missing or refuses connections means no
//! supervisor is running, which is reported as a domain state rather than an
//! I/O failure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bladerunner_config::SocketEndpoint;
use camino::Utf8Path;

use crate::config::ConfigError;
use crate::controller::{Controller, VmStatus};
use crate::errors::ControlError;
use crate::message::{
    CMD_CONFIG_GET, CMD_CONFIG_KEYS, CMD_CONFIG_SET, CMD_PING, CMD_STATUS, CMD_STOP, Message,
    RESP_OK, RESP_PONG,
};
use crate::transport::{Connection, Transport, is_unavailable, transport_for};
use crate::wire::{LineFormat, WireError, WireFormat};

/// Connection timeout for every request.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(1);
/// Round-trip budget for `ping` and `status`.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(2);
/// Round-trip budget for other commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how a [`ControlClient`] talks to the supervisor.
#[derive(Clone)]
pub struct ClientConfig {
    /// Transport used to reach the supervisor.
    pub transport: Arc<dyn Transport>,
    /// Transport address of the control socket.
    pub address: String,
    /// Codec; must match the supervisor's.
    pub wire: Arc<dyn WireFormat>,
    /// Connection timeout.
    pub dial_timeout: Duration,
    /// Read/write timeout for `ping` and `status`.
    pub query_timeout: Duration,
    /// Read/write timeout for everything else.
    pub command_timeout: Duration,
}

impl ClientConfig {
    /// Targets `endpoint` with the line format and default timeouts.
    pub fn for_endpoint(endpoint: &SocketEndpoint) -> Self {
        Self {
            transport: transport_for(endpoint),
            address: endpoint.address(),
            wire: Arc::new(LineFormat),
            dial_timeout: DIAL_TIMEOUT,
            query_timeout: QUERY_TIMEOUT,
            command_timeout: COMMAND_TIMEOUT,
        }
    }

    /// Targets the control socket inside `state_dir`.
    pub fn for_state_dir(state_dir: &Utf8Path) -> Self {
        Self::for_endpoint(&SocketEndpoint::in_state_dir(state_dir))
    }

    /// Replaces the codec.
    #[must_use]
    pub fn with_wire_format(mut self, wire: Arc<dyn WireFormat>) -> Self {
        self.wire = wire;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("transport", &self.transport.name())
            .field("address", &self.address)
            .field("wire", &self.wire)
            .field("dial_timeout", &self.dial_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// Client side of the control protocol.
#[derive(Debug, Clone)]
pub struct ControlClient {
    config: ClientConfig,
}

impl ControlClient {
    /// Creates a client from explicit settings.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Creates a client for the control socket in `state_dir`.
    pub fn for_state_dir(state_dir: &Utf8Path) -> Self {
        Self::new(ClientConfig::for_state_dir(state_dir))
    }

    /// The address this client dials.
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Reports whether a supervisor answers `ping`.
    pub fn is_running(&self) -> bool {
        self.ping().is_ok()
    }

    /// Sends an arbitrary command and returns the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::NotRunning`] when nothing listens, and
    /// [`ControlError::Server`] when the supervisor replies with an error.
    pub fn send_command(&self, command: &str) -> Result<String, ControlError> {
        self.request(command, self.config.command_timeout)
    }

    /// Reads a configuration value.
    ///
    /// # Errors
    ///
    /// As for [`ControlClient::send_command`].
    pub fn config_get(&self, key: &str) -> Result<String, ControlError> {
        self.send_command(&format!("{CMD_CONFIG_GET} {key}"))
    }

    /// Writes a configuration value.
    ///
    /// # Errors
    ///
    /// As for [`ControlClient::send_command`], plus
    /// [`ControlError::UnexpectedResponse`] for a reply other than `ok`.
    /// Keys and values that would not survive whitespace tokenisation are
    /// refused locally with [`ControlError::Config`].
    pub fn config_set(&self, key: &str, value: &str) -> Result<(), ControlError> {
        if !is_single_token(key) {
            return Err(ConfigError::UnknownKey {
                key: key.to_owned(),
            }
            .into());
        }
        if !is_single_token(value) {
            return Err(ConfigError::InvalidValue {
                key: key.to_owned(),
                reason: "value must not be empty or contain whitespace or control characters"
                    .to_owned(),
            }
            .into());
        }
        let command = format!("{CMD_CONFIG_SET} {key} {value}");
        let reply = self.send_command(&command)?;
        expect_reply(&command, reply, RESP_OK)
    }

    /// Lists every configuration key the supervisor knows.
    ///
    /// # Errors
    ///
    /// As for [`ControlClient::send_command`].
    pub fn config_keys(&self) -> Result<Vec<String>, ControlError> {
        let reply = self.send_command(CMD_CONFIG_KEYS)?;
        Ok(reply.split_whitespace().map(str::to_owned).collect())
    }

    fn request(&self, command: &str, timeout: Duration) -> Result<String, ControlError> {
        let mut connection = self.connect()?;
        let exchange = |error: WireError| ControlError::Exchange {
            command: command.to_owned(),
            source: error,
        };
        connection
            .set_timeout(timeout)
            .map_err(|error| exchange(error.into()))?;
        self.config
            .wire
            .encode(&mut connection, &Message::command(command))
            .map_err(exchange)?;
        let reply = self.config.wire.decode(&mut connection).map_err(exchange)?;
        match reply.error {
            Some(message) => Err(ControlError::Server { message }),
            None => Ok(reply.response.unwrap_or_default()),
        }
    }

    fn connect(&self) -> Result<Connection, ControlError> {
        self.config
            .transport
            .dial(&self.config.address, self.config.dial_timeout)
            .map_err(|source| {
                if is_unavailable(&source) {
                    ControlError::NotRunning
                } else {
                    ControlError::Connect {
                        address: self.config.address.clone(),
                        source,
                    }
                }
            })
    }
}

impl Controller for ControlClient {
    fn ping(&self) -> Result<(), ControlError> {
        let reply = self.request(CMD_PING, self.config.query_timeout)?;
        expect_reply(CMD_PING, reply, RESP_PONG)
    }

    fn status(&self) -> Result<VmStatus, ControlError> {
        match self.request(CMD_STATUS, self.config.query_timeout) {
            Ok(reply) => reply
                .parse()
                .map_err(|response| ControlError::UnexpectedResponse {
                    command: CMD_STATUS.to_owned(),
                    response,
                }),
            Err(ControlError::NotRunning) => Ok(VmStatus::Stopped),
            Err(error) => Err(error),
        }
    }

    fn stop(&self) -> Result<(), ControlError> {
        let reply = self.request(CMD_STOP, self.config.command_timeout)?;
        expect_reply(CMD_STOP, reply, RESP_OK)
    }
}

fn is_single_token(text: &str) -> bool {
    !text.is_empty() && !text.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn expect_reply(command: &str, reply: String, expected: &str) -> Result<(), ControlError> {
    if reply == expected {
        Ok(())
    } else {
        Err(ControlError::UnexpectedResponse {
            command: command.to_owned(),
            response: reply,
        })
    }
}
