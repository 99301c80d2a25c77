//! Static metadata for every configuration key exposed over the control
//! socket.

/// Instance name.
pub const KEY_NAME: &str = "name";
/// Guest hostname.
pub const KEY_HOSTNAME: &str = "hostname";
/// Per-instance state directory.
pub const KEY_STATE_DIR: &str = "state-dir";
/// VM artefact directory.
pub const KEY_VM_DIR: &str = "vm-dir";
/// Guest CPU count.
pub const KEY_CPUS: &str = "cpus";
/// Guest memory in GiB.
pub const KEY_MEMORY_GIB: &str = "memory-gib";
/// Guest disk size in GiB.
pub const KEY_DISK_SIZE_GIB: &str = "disk-size-gib";
/// Host architecture.
pub const KEY_ARCH: &str = "arch";
/// Network mode.
pub const KEY_NETWORK_MODE: &str = "network-mode";
/// Host port forwarded to guest SSH.
pub const KEY_LOCAL_SSH_PORT: &str = "local-ssh-port";
/// Host port forwarded to the guest API.
pub const KEY_LOCAL_API_PORT: &str = "local-api-port";
/// SSH user.
pub const KEY_SSH_USER: &str = "ssh-user";
/// SSH private key path.
pub const KEY_SSH_PRIVATE_KEY_PATH: &str = "ssh-private-key-path";
/// Generated SSH client config path.
pub const KEY_SSH_CONFIG_PATH: &str = "ssh-config-path";
/// Supervisor log file.
pub const KEY_LOG_PATH: &str = "log-path";
/// Graphical console flag.
pub const KEY_GUI: &str = "gui";
/// Cloud image URL.
pub const KEY_BASE_IMAGE_URL: &str = "base-image-url";
/// Resolved base image path.
pub const KEY_BASE_IMAGE_PATH: &str = "base-image-path";
/// Cloud-init seed ISO path.
pub const KEY_CLOUD_INIT_ISO: &str = "cloud-init-iso";
/// Supervisor process id.
pub const KEY_PID: &str = "pid";

/// Describes how a configuration key may be read and changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigKeyMeta {
    /// Key name as used on the wire.
    pub key: &'static str,
    /// The value only exists once the VM has started.
    pub requires_vm: bool,
    /// A change only takes effect after a VM reset.
    pub requires_reset: bool,
    /// The key accepts `config.set`.
    pub writable: bool,
    /// One-line human readable description.
    pub description: &'static str,
}

impl ConfigKeyMeta {
    const fn plain(key: &'static str, description: &'static str) -> Self {
        Self {
            key,
            requires_vm: false,
            requires_reset: false,
            writable: false,
            description,
        }
    }

    const fn runtime(key: &'static str, description: &'static str) -> Self {
        Self {
            requires_vm: true,
            ..Self::plain(key, description)
        }
    }

    const fn reset(key: &'static str, description: &'static str) -> Self {
        Self {
            requires_reset: true,
            ..Self::plain(key, description)
        }
    }

    const fn writable(self) -> Self {
        Self {
            writable: true,
            ..self
        }
    }

    /// Short labels for CLI listings.
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        if self.requires_vm {
            tags.push("runtime");
        }
        if self.requires_reset {
            tags.push("reset required");
        }
        if self.writable {
            tags.push("writable");
        }
        tags
    }
}

static REGISTRY: [ConfigKeyMeta; 20] = [
    ConfigKeyMeta::plain(KEY_ARCH, "Host architecture"),
    ConfigKeyMeta::runtime(KEY_BASE_IMAGE_PATH, "Resolved base image path"),
    ConfigKeyMeta::reset(KEY_BASE_IMAGE_URL, "Cloud image URL").writable(),
    ConfigKeyMeta::plain(KEY_CLOUD_INIT_ISO, "Cloud-init ISO path"),
    ConfigKeyMeta::reset(KEY_CPUS, "Number of CPUs"),
    ConfigKeyMeta::reset(KEY_DISK_SIZE_GIB, "Disk size in GiB"),
    ConfigKeyMeta::reset(KEY_GUI, "GUI console enabled"),
    ConfigKeyMeta::reset(KEY_HOSTNAME, "VM hostname"),
    ConfigKeyMeta::reset(KEY_LOCAL_API_PORT, "Local API port"),
    ConfigKeyMeta::reset(KEY_LOCAL_SSH_PORT, "Local SSH port"),
    ConfigKeyMeta::plain(KEY_LOG_PATH, "Log file path"),
    ConfigKeyMeta::reset(KEY_MEMORY_GIB, "Memory in GiB"),
    ConfigKeyMeta::plain(KEY_NAME, "Instance name"),
    ConfigKeyMeta::reset(KEY_NETWORK_MODE, "Network mode (shared/bridged)"),
    ConfigKeyMeta::runtime(KEY_PID, "VM process ID"),
    ConfigKeyMeta::runtime(KEY_SSH_CONFIG_PATH, "SSH config file path"),
    ConfigKeyMeta::runtime(KEY_SSH_PRIVATE_KEY_PATH, "SSH private key path"),
    ConfigKeyMeta::plain(KEY_SSH_USER, "SSH user"),
    ConfigKeyMeta::plain(KEY_STATE_DIR, "State directory"),
    ConfigKeyMeta::plain(KEY_VM_DIR, "VM directory"),
];

/// Every known key, sorted by name.
pub fn config_key_registry() -> &'static [ConfigKeyMeta] {
    &REGISTRY
}

/// Looks up the metadata for `key`.
pub fn config_key_meta(key: &str) -> Option<&'static ConfigKeyMeta> {
    REGISTRY.iter().find(|meta| meta.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn registry_is_sorted_and_unique() {
        let keys: Vec<_> = config_key_registry().iter().map(|meta| meta.key).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn only_the_image_url_is_writable() {
        let writable: Vec<_> = config_key_registry()
            .iter()
            .filter(|meta| meta.writable)
            .map(|meta| meta.key)
            .collect();
        assert_eq!(writable, vec![KEY_BASE_IMAGE_URL]);
    }

    #[rstest]
    #[case(KEY_PID, vec!["runtime"])]
    #[case(KEY_BASE_IMAGE_URL, vec!["reset required", "writable"])]
    #[case(KEY_NAME, vec![])]
    fn tags_reflect_flags(#[case] key: &str, #[case] expected: Vec<&str>) {
        let meta = config_key_meta(key).expect("known key");
        assert_eq!(meta.tags(), expected);
    }

    #[test]
    fn unknown_keys_have_no_metadata() {
        assert!(config_key_meta("colour").is_none());
    }
}
