//! Command-line flags for `bladerunnerd`.
//!
//! Every flag can also be supplied through a `BLADERUNNER_*` environment
//! variable so launchers can configure the supervisor without a shell.

use bladerunner_config::{
    DEFAULT_LOCAL_API_PORT, DEFAULT_LOCAL_SSH_PORT, DEFAULT_LOG_FILTER, DEFAULT_VSOCK_API_PORT,
    DEFAULT_VSOCK_SSH_PORT, LogFormat, RuntimeConfig, SocketEndpoint, default_state_dir,
};
use bladerunner_control::WireFormatKind;
use camino::Utf8PathBuf;
use clap::Parser;

/// Flags accepted by the supervisor binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "bladerunnerd", version, about = "Bladerunner VM supervisor")]
pub struct SupervisorArgs {
    /// Per-instance state directory.
    #[arg(long, env = "BLADERUNNER_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<Utf8PathBuf>,
    /// Control socket endpoint; defaults to `<state-dir>/control.sock`.
    #[arg(long, env = "BLADERUNNER_CONTROL_SOCKET", value_name = "URL")]
    pub control_socket: Option<SocketEndpoint>,
    /// Control protocol framing (`line` or `json`).
    #[arg(long, env = "BLADERUNNER_WIRE_FORMAT", default_value_t = WireFormatKind::Line)]
    pub wire: WireFormatKind,
    /// Tracing filter directives.
    #[arg(long, env = "BLADERUNNER_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
    /// Log output format (`compact` or `json`).
    #[arg(long, env = "BLADERUNNER_LOG_FORMAT", default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
    /// Guest vsock context id; enables SSH and API forwarding when set.
    #[arg(long, env = "BLADERUNNER_GUEST_CID", value_name = "CID")]
    pub guest_cid: Option<u32>,
    /// Host loopback port forwarded to guest SSH.
    #[arg(long, env = "BLADERUNNER_LOCAL_SSH_PORT", default_value_t = DEFAULT_LOCAL_SSH_PORT)]
    pub local_ssh_port: u16,
    /// Host loopback port forwarded to the guest API.
    #[arg(long, env = "BLADERUNNER_LOCAL_API_PORT", default_value_t = DEFAULT_LOCAL_API_PORT)]
    pub local_api_port: u16,
    /// Guest vsock port of the SSH service.
    #[arg(long, env = "BLADERUNNER_VSOCK_SSH_PORT", default_value_t = DEFAULT_VSOCK_SSH_PORT)]
    pub vsock_ssh_port: u32,
    /// Guest vsock port of the API service.
    #[arg(long, env = "BLADERUNNER_VSOCK_API_PORT", default_value_t = DEFAULT_VSOCK_API_PORT)]
    pub vsock_api_port: u32,
}

impl SupervisorArgs {
    /// The state directory, falling back to the per-user default.
    pub fn state_dir(&self) -> Utf8PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    /// The control endpoint, falling back to the state directory socket.
    pub fn control_endpoint(&self) -> SocketEndpoint {
        self.control_socket
            .clone()
            .unwrap_or_else(|| SocketEndpoint::in_state_dir(&self.state_dir()))
    }

    /// Initial runtime configuration with port overrides applied.
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::for_state_dir(&self.state_dir());
        config.local_ssh_port = self.local_ssh_port;
        config.local_api_port = self.local_api_port;
        config.vsock_ssh_port = self.vsock_ssh_port;
        config.vsock_api_port = self.vsock_api_port;
        config
    }
}
