//! Command-line interface for `br`.

use bladerunner_config::{SocketEndpoint, default_state_dir};
use bladerunner_control::WireFormatKind;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Default time `br stop` waits for the supervisor to release its socket.
pub(crate) const STOP_TIMEOUT_SECS: u64 = 10;

/// Talks to a running Bladerunner VM supervisor.
#[derive(Parser, Debug)]
#[command(name = "br", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Per-instance state directory.
    #[arg(long, global = true, env = "BLADERUNNER_STATE_DIR", value_name = "DIR")]
    pub(crate) state_dir: Option<Utf8PathBuf>,
    /// Control socket endpoint; defaults to `<state-dir>/control.sock`.
    #[arg(long, global = true, env = "BLADERUNNER_CONTROL_SOCKET", value_name = "URL")]
    pub(crate) control_socket: Option<SocketEndpoint>,
    /// Control protocol framing; must match the supervisor's.
    #[arg(
        long,
        global = true,
        env = "BLADERUNNER_WIRE_FORMAT",
        default_value_t = WireFormatKind::Line
    )]
    pub(crate) wire: WireFormatKind,
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

impl Cli {
    /// The endpoint to dial.
    pub(crate) fn endpoint(&self) -> SocketEndpoint {
        self.control_socket.clone().unwrap_or_else(|| {
            let state_dir = self.state_dir.clone().unwrap_or_else(default_state_dir);
            SocketEndpoint::in_state_dir(&state_dir)
        })
    }
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Checks that the supervisor answers.
    Ping,
    /// Prints `running` or `stopped`.
    Status,
    /// Asks the supervisor to shut down and waits for it to go away.
    Stop {
        /// Seconds to wait for the control socket to disappear.
        #[arg(long, value_name = "SECS", default_value_t = STOP_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Reads or changes runtime configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum ConfigAction {
    /// Prints one value.
    Get { key: String },
    /// Changes a writable value.
    Set { key: String, value: String },
    /// Lists every key with its flags, and live values when the VM runs.
    Keys,
}
