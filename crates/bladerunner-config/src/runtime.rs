//! Live configuration values of a supervised VM instance.
//!
//! The supervisor owns one [`RuntimeConfig`] for the lifetime of the process.
//! Some values are only known after the guest has booted (the SSH material,
//! the resolved base image and the supervisor pid); those fields stay empty
//! until the supervisor assigns them.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_CPUS, DEFAULT_DISK_SIZE_GIB, DEFAULT_LOCAL_API_PORT, DEFAULT_LOCAL_SSH_PORT,
    DEFAULT_MEMORY_GIB, DEFAULT_NAME, DEFAULT_NETWORK_MODE, DEFAULT_SSH_USER,
    DEFAULT_VSOCK_API_PORT, DEFAULT_VSOCK_SSH_PORT, default_base_image_url, default_state_dir,
};

/// Mutable configuration of a running instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Instance name.
    pub name: String,
    /// Guest hostname.
    pub hostname: String,
    /// Per-instance state directory.
    pub state_dir: Utf8PathBuf,
    /// Directory holding the VM disk and firmware artefacts.
    pub vm_dir: Utf8PathBuf,
    /// Number of guest CPUs.
    pub cpus: u32,
    /// Guest memory in GiB.
    pub memory_gib: u64,
    /// Guest disk size in GiB.
    pub disk_size_gib: u32,
    /// Host architecture.
    pub arch: String,
    /// Network mode (`shared` or `bridged`).
    pub network_mode: String,
    /// Host loopback port forwarded to guest SSH.
    pub local_ssh_port: u16,
    /// Host loopback port forwarded to the guest API.
    pub local_api_port: u16,
    /// Guest vsock port of the SSH service.
    pub vsock_ssh_port: u32,
    /// Guest vsock port of the API service.
    pub vsock_api_port: u32,
    /// SSH user provisioned in the guest.
    pub ssh_user: String,
    /// Private key used to reach the guest; assigned once keys exist.
    pub ssh_private_key_path: String,
    /// Generated SSH client config; assigned after the guest boots.
    pub ssh_config_path: String,
    /// Supervisor log file.
    pub log_path: Utf8PathBuf,
    /// Whether the graphical console is enabled.
    pub gui: bool,
    /// Cloud image URL.
    pub base_image_url: String,
    /// Resolved base image path; assigned once the image is available.
    pub base_image_path: String,
    /// Cloud-init seed ISO path.
    pub cloud_init_iso: Utf8PathBuf,
    /// Supervisor process id; assigned when the VM starts.
    pub pid: Option<u32>,
}

impl RuntimeConfig {
    /// Builds the default configuration rooted at `state_dir`.
    #[must_use]
    pub fn for_state_dir(state_dir: &Utf8Path) -> Self {
        let arch = std::env::consts::ARCH;
        Self {
            name: DEFAULT_NAME.to_owned(),
            hostname: DEFAULT_NAME.to_owned(),
            state_dir: state_dir.to_path_buf(),
            vm_dir: state_dir.to_path_buf(),
            cpus: DEFAULT_CPUS,
            memory_gib: DEFAULT_MEMORY_GIB,
            disk_size_gib: DEFAULT_DISK_SIZE_GIB,
            arch: arch.to_owned(),
            network_mode: DEFAULT_NETWORK_MODE.to_owned(),
            local_ssh_port: DEFAULT_LOCAL_SSH_PORT,
            local_api_port: DEFAULT_LOCAL_API_PORT,
            vsock_ssh_port: DEFAULT_VSOCK_SSH_PORT,
            vsock_api_port: DEFAULT_VSOCK_API_PORT,
            ssh_user: DEFAULT_SSH_USER.to_owned(),
            ssh_private_key_path: String::new(),
            ssh_config_path: String::new(),
            log_path: state_dir.join("bladerunner.log"),
            gui: true,
            base_image_url: default_base_image_url(arch)
                .unwrap_or_default()
                .to_owned(),
            base_image_path: String::new(),
            cloud_init_iso: state_dir.join("cloud-init.iso"),
            pid: None,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::for_state_dir(&default_state_dir())
    }
}
