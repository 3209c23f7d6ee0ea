//! Host-side settings for the command-line drivers.
//!
//! Settings are loaded from environment variables with sensible defaults.

/// Where the drivers find their host tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    /// `vmrun` binary (VMware Workstation)
    pub vmrun: String,
    /// `VBoxManage` binary (VirtualBox)
    pub vboxmanage: String,
    /// `ssh` client used by remote drivers
    pub ssh: String,
    /// `scp` client used by remote file transfer
    pub scp: String,
    /// Staging directory on remote hosts for file transfer
    pub remote_tmp: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            vmrun: "vmrun".into(),
            vboxmanage: "VBoxManage".into(),
            ssh: "ssh".into(),
            scp: "scp".into(),
            remote_tmp: "/tmp".into(),
        }
    }
}

impl DriverSettings {
    /// Load settings from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LABVM_VMRUN` | `vmrun` |
    /// | `LABVM_VBOXMANAGE` | `VBoxManage` |
    /// | `LABVM_SSH` | `ssh` |
    /// | `LABVM_SCP` | `scp` |
    /// | `LABVM_REMOTE_TMP` | `/tmp` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let var = |key: &str, fallback: String| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(fallback)
        };

        Self {
            vmrun: var("LABVM_VMRUN", default.vmrun),
            vboxmanage: var("LABVM_VBOXMANAGE", default.vboxmanage),
            ssh: var("LABVM_SSH", default.ssh),
            scp: var("LABVM_SCP", default.scp),
            remote_tmp: var("LABVM_REMOTE_TMP", default.remote_tmp),
        }
    }
}
