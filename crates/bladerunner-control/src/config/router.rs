//! `config.get`, `config.set`, and `config.keys` over the live configuration.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bladerunner_config::RuntimeConfig;
use url::Url;

use super::ConfigError;
use super::keys::{
    ConfigKeyMeta, KEY_ARCH, KEY_BASE_IMAGE_PATH, KEY_BASE_IMAGE_URL, KEY_CLOUD_INIT_ISO,
    KEY_CPUS, KEY_DISK_SIZE_GIB, KEY_GUI, KEY_HOSTNAME, KEY_LOCAL_API_PORT, KEY_LOCAL_SSH_PORT,
    KEY_LOG_PATH, KEY_MEMORY_GIB, KEY_NAME, KEY_NETWORK_MODE, KEY_PID, KEY_SSH_CONFIG_PATH,
    KEY_SSH_PRIVATE_KEY_PATH, KEY_SSH_USER, KEY_STATE_DIR, KEY_VM_DIR, config_key_meta,
    config_key_registry,
};
use crate::message::{Message, RESP_OK};
use crate::observer::ControlObserver;
use crate::request::Request;
use crate::router::Router;

/// Live configuration shared between the supervisor and the control plane.
pub type SharedConfig = Arc<RwLock<RuntimeConfig>>;

/// Serves configuration commands against a [`SharedConfig`].
///
/// The configuration is held by reference: values the supervisor assigns
/// after the router is mounted are visible to the next `config.get`.
#[derive(Debug, Clone)]
pub struct ConfigRouter {
    config: SharedConfig,
}

impl ConfigRouter {
    /// Wraps an existing shared configuration.
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    /// Takes ownership of `config` and shares it.
    pub fn from_config(config: RuntimeConfig) -> Self {
        Self::new(Arc::new(RwLock::new(config)))
    }

    /// The shared configuration, for callers that assign late-bound values.
    pub fn shared(&self) -> SharedConfig {
        Arc::clone(&self.config)
    }

    /// Runs `update` under the write lock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Poisoned`] when a previous writer panicked.
    pub fn update<R>(&self, update: impl FnOnce(&mut RuntimeConfig) -> R) -> Result<R, ConfigError> {
        let mut config = self.write()?;
        Ok(update(&mut config))
    }

    /// Reads the current value of `key`.
    ///
    /// # Errors
    ///
    /// Fails for unknown keys and for runtime keys whose value has not been
    /// assigned yet.
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let meta = lookup(key)?;
        let value = {
            let config = self.read()?;
            read_value(&config, meta.key)
        };
        if value.is_empty() && meta.requires_vm {
            return Err(ConfigError::NotAvailable {
                key: meta.key.to_owned(),
            });
        }
        Ok(value)
    }

    /// Assigns `value` to a writable key.
    ///
    /// # Errors
    ///
    /// Fails for unknown and read-only keys, and when the value does not
    /// validate.
    pub fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let meta = lookup(key)?;
        if !meta.writable {
            return Err(ConfigError::ReadOnly {
                key: meta.key.to_owned(),
            });
        }
        let mut config = self.write()?;
        write_value(&mut config, meta.key, value)
    }

    /// Every registered key, sorted and space separated.
    pub fn keys(&self) -> String {
        let mut keys: Vec<&str> = config_key_registry().iter().map(|meta| meta.key).collect();
        keys.sort_unstable();
        keys.join(" ")
    }

    /// Builds a router exposing `get`, `set`, and `keys`, ready to mount
    /// under `config`.
    pub fn router(&self, observer: Arc<dyn ControlObserver>) -> Router {
        let mut router = Router::with_observer(observer);

        let config = self.clone();
        router.handle("get", move |request: &Request| {
            let Some(key) = request.named_or_positional("key", 0) else {
                return Message::error(ConfigError::GetUsage.to_string());
            };
            match config.get(key) {
                Ok(value) => Message::response(value),
                Err(error) => Message::error(error.to_string()),
            }
        });

        let config = self.clone();
        router.handle("set", move |request: &Request| {
            let Some((key, value)) = set_arguments(request) else {
                return Message::error(ConfigError::SetUsage.to_string());
            };
            match config.set(key, value) {
                Ok(()) => Message::response(RESP_OK),
                Err(error) => Message::error(error.to_string()),
            }
        });

        let config = self.clone();
        router.handle("keys", move |_: &Request| Message::response(config.keys()));

        router
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RuntimeConfig>, ConfigError> {
        self.config.read().map_err(|_: PoisonError<_>| ConfigError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RuntimeConfig>, ConfigError> {
        self.config.write().map_err(|_: PoisonError<_>| ConfigError::Poisoned)
    }
}

/// Extracts `(key, value)` from `set key value`, `set key=k value=v`, or
/// `set key=k v`. Positional values are counted after the key is consumed;
/// a positional argument left over means the value was split on whitespace,
/// so the request is refused rather than applied truncated.
fn set_arguments(request: &Request) -> Option<(&str, &str)> {
    let mut consumed = 0;
    let key = match request.arg("key") {
        Some(key) => key,
        None => {
            consumed += 1;
            request.positional(0)?
        }
    };
    let value = match request.arg("value") {
        Some(value) => value,
        None => {
            let value = request.positional(consumed)?;
            consumed += 1;
            value
        }
    };
    if request.positional(consumed).is_some() {
        return None;
    }
    Some((key, value))
}

fn lookup(key: &str) -> Result<&'static ConfigKeyMeta, ConfigError> {
    config_key_meta(key).ok_or_else(|| ConfigError::UnknownKey {
        key: key.to_owned(),
    })
}

/// Renders the live value of a registered key. Unset values render empty.
fn read_value(config: &RuntimeConfig, key: &str) -> String {
    match key {
        KEY_ARCH => config.arch.clone(),
        KEY_BASE_IMAGE_PATH => config.base_image_path.clone(),
        KEY_BASE_IMAGE_URL => config.base_image_url.clone(),
        KEY_CLOUD_INIT_ISO => config.cloud_init_iso.to_string(),
        KEY_CPUS => config.cpus.to_string(),
        KEY_DISK_SIZE_GIB => config.disk_size_gib.to_string(),
        KEY_GUI => config.gui.to_string(),
        KEY_HOSTNAME => config.hostname.clone(),
        KEY_LOCAL_API_PORT => config.local_api_port.to_string(),
        KEY_LOCAL_SSH_PORT => config.local_ssh_port.to_string(),
        KEY_LOG_PATH => config.log_path.to_string(),
        KEY_MEMORY_GIB => config.memory_gib.to_string(),
        KEY_NAME => config.name.clone(),
        KEY_NETWORK_MODE => config.network_mode.clone(),
        KEY_PID => config.pid.map(|pid| pid.to_string()).unwrap_or_default(),
        KEY_SSH_CONFIG_PATH => config.ssh_config_path.clone(),
        KEY_SSH_PRIVATE_KEY_PATH => config.ssh_private_key_path.clone(),
        KEY_SSH_USER => config.ssh_user.clone(),
        KEY_STATE_DIR => config.state_dir.to_string(),
        KEY_VM_DIR => config.vm_dir.to_string(),
        _ => String::new(),
    }
}

/// Applies `value` to a writable key after validating it.
fn write_value(config: &mut RuntimeConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        KEY_BASE_IMAGE_URL => {
            let url = Url::parse(value).map_err(|error| ConfigError::InvalidValue {
                key: key.to_owned(),
                reason: error.to_string(),
            })?;
            config.base_image_url = url.into();
            Ok(())
        }
        _ => Err(ConfigError::ReadOnly {
            key: key.to_owned(),
        }),
    }
}
