//! Protocol envelope and well-known command vocabulary.

use serde::{Deserialize, Serialize};

/// Current control protocol version. Bump on breaking wire changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Liveness probe command.
pub const CMD_PING: &str = "ping";
/// Status query command.
pub const CMD_STATUS: &str = "status";
/// Graceful shutdown command.
pub const CMD_STOP: &str = "stop";
/// Config read command.
pub const CMD_CONFIG_GET: &str = "config.get";
/// Config write command.
pub const CMD_CONFIG_SET: &str = "config.set";
/// Config key listing command.
pub const CMD_CONFIG_KEYS: &str = "config.keys";

/// Reply to a successful `stop` or `config.set`.
pub const RESP_OK: &str = "ok";
/// Reply to `ping`.
pub const RESP_PONG: &str = "pong";

/// A control protocol message.
///
/// Client-to-server messages carry a `command`; server-to-client messages
/// carry either a `response` or an `error`. A `version` of zero denotes the
/// legacy unversioned protocol and is omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "is_legacy_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const fn is_legacy_version(version: &u32) -> bool {
    *version == 0
}

impl Message {
    /// Builds a command message stamped with [`PROTOCOL_VERSION`].
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Builds a successful reply.
    pub fn response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            ..Self::default()
        }
    }

    /// Builds an error reply.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Returns the same message carrying `version`.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Returns `true` when the message carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Converts a reply into a `Result`, preferring the error field.
    pub fn into_result(self) -> Result<String, String> {
        match (self.error, self.response) {
            (Some(error), _) => Err(error),
            (None, Some(response)) => Ok(response),
            (None, None) => Ok(String::new()),
        }
    }
}
