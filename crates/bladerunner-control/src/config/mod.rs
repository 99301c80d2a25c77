//! Configuration sub-protocol mounted under the `config` namespace.

mod keys;
mod router;

use thiserror::Error;

pub use self::keys::{
    ConfigKeyMeta, KEY_ARCH, KEY_BASE_IMAGE_PATH, KEY_BASE_IMAGE_URL, KEY_CLOUD_INIT_ISO,
    KEY_CPUS, KEY_DISK_SIZE_GIB, KEY_GUI, KEY_HOSTNAME, KEY_LOCAL_API_PORT, KEY_LOCAL_SSH_PORT,
    KEY_LOG_PATH, KEY_MEMORY_GIB, KEY_NAME, KEY_NETWORK_MODE, KEY_PID, KEY_SSH_CONFIG_PATH,
    KEY_SSH_PRIVATE_KEY_PATH, KEY_SSH_USER, KEY_STATE_DIR, KEY_VM_DIR, config_key_meta,
    config_key_registry,
};
pub use self::router::{ConfigRouter, SharedConfig};

/// Namespace the config router is mounted under.
pub const CONFIG_NAMESPACE: &str = "config";

/// Errors returned by configuration commands. Each renders as one line that
/// names the offending key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The key is not in the registry.
    #[error("unknown config key: {key}")]
    UnknownKey { key: String },
    /// The key only has a value once the VM has started.
    #[error("{key} not available (VM may not have started yet)")]
    NotAvailable { key: String },
    /// The key cannot be changed at runtime.
    #[error("config key {key} is read-only")]
    ReadOnly { key: String },
    /// The value failed validation.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    /// `config.get` was sent without a key.
    #[error("usage: config.get <key>")]
    GetUsage,
    /// `config.set` was sent without a key and value.
    #[error("usage: config.set <key> <value>")]
    SetUsage,
    /// A writer panicked while holding the configuration lock.
    #[error("configuration lock poisoned")]
    Poisoned,
}
