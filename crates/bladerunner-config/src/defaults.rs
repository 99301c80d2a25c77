use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use libc::geteuid;

/// File name of the control socket inside the state directory.
pub const CONTROL_SOCKET_NAME: &str = "control.sock";

/// Default instance name.
pub const DEFAULT_NAME: &str = "bladerunner";

/// Default number of guest CPUs.
pub const DEFAULT_CPUS: u32 = 4;

/// Default guest memory in GiB.
pub const DEFAULT_MEMORY_GIB: u64 = 8;

/// Default guest disk size in GiB.
pub const DEFAULT_DISK_SIZE_GIB: u32 = 64;

/// Default SSH user provisioned in the guest.
pub const DEFAULT_SSH_USER: &str = "incus";

/// Host loopback port forwarded to the guest SSH service.
pub const DEFAULT_LOCAL_SSH_PORT: u16 = 6022;

/// Host loopback port forwarded to the guest API service.
pub const DEFAULT_LOCAL_API_PORT: u16 = 18443;

/// Guest vsock port of the SSH service.
pub const DEFAULT_VSOCK_SSH_PORT: u32 = 10022;

/// Guest vsock port of the API service.
pub const DEFAULT_VSOCK_API_PORT: u32 = 18443;

/// Default network mode.
pub const DEFAULT_NETWORK_MODE: &str = "shared";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Default cloud image for the host architecture, if one is published.
#[must_use]
pub fn default_base_image_url(arch: &str) -> Option<&'static str> {
    match arch {
        "aarch64" => Some(
            "https://cloud-images.ubuntu.com/releases/24.04/release/ubuntu-24.04-server-cloudimg-arm64.img",
        ),
        "x86_64" => Some(
            "https://cloud-images.ubuntu.com/releases/24.04/release/ubuntu-24.04-server-cloudimg-amd64.img",
        ),
        _ => None,
    }
}

/// Computes the default per-instance state directory.
///
/// Prefers `$HOME/.local/state/bladerunner` and falls back to a per-user
/// directory under the system temporary directory.
#[must_use]
pub fn default_state_dir() -> Utf8PathBuf {
    default_state_dir_inner()
}

#[cfg(unix)]
fn default_state_dir_inner() -> Utf8PathBuf {
    match home_base_directory() {
        Some(mut dir) => {
            dir.push(".local");
            dir.push("state");
            dir.push("bladerunner");
            dir
        }
        None => {
            let mut dir = fallback_base_directory();
            dir.push("bladerunner");
            dir.push(user_namespace());
            dir
        }
    }
}

#[cfg(unix)]
fn home_base_directory() -> Option<Utf8PathBuf> {
    dirs::home_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_state_dir_inner() -> Utf8PathBuf {
    let mut dir = fallback_base_directory();
    dir.push("bladerunner");
    dir
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
