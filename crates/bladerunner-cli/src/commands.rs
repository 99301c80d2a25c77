//! Command execution against the remote controller.

use std::io::Write;
use std::time::Duration;

use bladerunner_config::SocketEndpoint;
use bladerunner_control::config::{ConfigKeyMeta, config_key_meta, config_key_registry};
use bladerunner_control::{ConfigError, ControlClient, ControlError, Controller};

use crate::cli::{CliCommand, ConfigAction};
use crate::errors::AppError;
use crate::shutdown::wait_for_shutdown;

const KEY_COLUMN: usize = 22;

pub(crate) fn execute<W: Write>(
    command: &CliCommand,
    client: &ControlClient,
    endpoint: &SocketEndpoint,
    stdout: &mut W,
) -> Result<(), AppError> {
    match command {
        CliCommand::Ping => {
            client.ping()?;
            writeln!(stdout, "pong")?;
        }
        CliCommand::Status => {
            writeln!(stdout, "{}", client.status()?)?;
        }
        CliCommand::Stop { timeout } => {
            client.stop()?;
            wait_for_shutdown(client, endpoint, Duration::from_secs(*timeout))?;
            writeln!(stdout, "stopped")?;
        }
        CliCommand::Config { action } => config(action, client, stdout)?,
    }
    Ok(())
}

fn config<W: Write>(
    action: &ConfigAction,
    client: &ControlClient,
    stdout: &mut W,
) -> Result<(), AppError> {
    match action {
        ConfigAction::Get { key } => {
            writeln!(stdout, "{}", client.config_get(key)?)?;
        }
        ConfigAction::Set { key, value } => {
            let meta = writable_meta(key)?;
            client.config_set(key, value)?;
            if meta.requires_reset {
                writeln!(stdout, "{key} updated; takes effect after the VM is reset")?;
            } else {
                writeln!(stdout, "{key} updated")?;
            }
        }
        ConfigAction::Keys => {
            let live = client.is_running();
            for meta in config_key_registry() {
                let value = if live { live_value(client, meta)? } else { None };
                writeln!(stdout, "{}", key_line(meta, value.as_deref()))?;
            }
        }
    }
    Ok(())
}

/// Rejects unknown and read-only keys before dialling the supervisor.
fn writable_meta(key: &str) -> Result<&'static ConfigKeyMeta, ConfigError> {
    let meta = config_key_meta(key).ok_or_else(|| ConfigError::UnknownKey {
        key: key.to_owned(),
    })?;
    if meta.writable {
        Ok(meta)
    } else {
        Err(ConfigError::ReadOnly {
            key: key.to_owned(),
        })
    }
}

fn live_value(client: &ControlClient, meta: &ConfigKeyMeta) -> Result<Option<String>, AppError> {
    match client.config_get(meta.key) {
        Ok(value) => Ok(Some(value)),
        // Runtime keys without a value yet.
        Err(ControlError::Server { .. }) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

fn key_line(meta: &ConfigKeyMeta, value: Option<&str>) -> String {
    let mut line = format!("{:<KEY_COLUMN$} {}", meta.key, meta.description);
    let tags = meta.tags();
    if !tags.is_empty() {
        line.push_str(&format!(" [{}]", tags.join(", ")));
    }
    if let Some(value) = value {
        line.push_str(&format!(" = {value}"));
    }
    line
}
