//! The contract every backend driver implements.

use crate::error::{Result, VmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of backend families a lab VM can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DriverKind {
    /// Local desktop hypervisor (VMware Workstation)
    Workstation,
    /// Desktop hypervisor on another host, reached over ssh
    RemoteWorkstation,
    /// Local type-2 hypervisor with a native snapshot API (VirtualBox)
    VirtualBox,
    /// Cloud fabric; receives the `fog_config` blob
    Fog,
    /// Network-topology emulator; receives the `dynagen_config` blob
    Dynagen,
    /// Remote bare-metal hypervisor management (ESXi over ssh)
    RemoteEsxi,
    /// Enterprise virtualization cluster (vSphere)
    Vsphere,
    /// Cloud hypervisor API (XenAPI)
    XenApi,
}

impl DriverKind {
    /// Every known driver family.
    pub const ALL: [DriverKind; 8] = [
        DriverKind::Workstation,
        DriverKind::RemoteWorkstation,
        DriverKind::VirtualBox,
        DriverKind::Fog,
        DriverKind::Dynagen,
        DriverKind::RemoteEsxi,
        DriverKind::Vsphere,
        DriverKind::XenApi,
    ];

    /// Normalized (lower-case) identifier used in configuration records.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Workstation => "workstation",
            DriverKind::RemoteWorkstation => "remote_workstation",
            DriverKind::VirtualBox => "virtualbox",
            DriverKind::Fog => "fog",
            DriverKind::Dynagen => "dynagen",
            DriverKind::RemoteEsxi => "remote_esxi",
            DriverKind::Vsphere => "vsphere",
            DriverKind::XenApi => "xenapi",
        }
    }

    /// Configuration key of the opaque blob this family is built with, if any.
    pub fn blob_key(&self) -> Option<&'static str> {
        match self {
            DriverKind::Fog => Some("fog_config"),
            DriverKind::Dynagen => Some("dynagen_config"),
            _ => None,
        }
    }

    /// Parse a driver type (case-insensitive).
    ///
    /// # Errors
    /// Returns [`VmError::UnknownDriver`] carrying the lower-cased input.
    pub fn parse(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        DriverKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or(VmError::UnknownDriver(normalized))
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Output of a command run inside the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code of the command
    pub exit_code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl ExecResult {
    /// Check if the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Backend driver for one VM.
///
/// A driver is built once per [`Vm`](crate::Vm) and owned by it for the
/// entity's whole lifetime. Error and no-op semantics are entirely up to the
/// backend; failures are passed through to the caller unchanged.
///
/// Runtime arguments (paths, commands, snapshot names) are forwarded
/// verbatim and are not sanitized.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Which family this driver belongs to.
    fn kind(&self) -> DriverKind;

    /// Whether the VM is currently running.
    async fn is_running(&self) -> Result<bool>;

    /// Where the backend says the VM currently lives.
    ///
    /// This may differ from the configured location (e.g. after migration).
    async fn current_location(&self) -> Result<String>;

    /// Power on.
    async fn start(&self) -> Result<()>;

    /// Power off.
    async fn stop(&self) -> Result<()>;

    /// Pause execution.
    async fn pause(&self) -> Result<()>;

    /// Suspend to disk.
    async fn suspend(&self) -> Result<()>;

    /// Resume from pause or suspend.
    async fn resume(&self) -> Result<()>;

    /// Hard reset.
    async fn reset(&self) -> Result<()>;

    /// Names of the snapshots the backend currently holds.
    async fn query_snapshots(&self) -> Result<Vec<String>>;

    /// Take a snapshot.
    async fn create_snapshot(&self, name: &str) -> Result<()>;

    /// Revert to a snapshot.
    async fn revert_snapshot(&self, name: &str) -> Result<()>;

    /// Delete a snapshot.
    async fn delete_snapshot(&self, name: &str) -> Result<()>;

    /// Copy a host file into the guest.
    async fn copy_to(&self, from: &str, to: &str) -> Result<()>;

    /// Copy a guest file to the host.
    async fn copy_from(&self, from: &str, to: &str) -> Result<()>;

    /// Run a command inside the guest.
    async fn run_command(&self, command: &str) -> Result<ExecResult>;

    /// Check whether a path exists inside the guest.
    async fn check_file_exists(&self, path: &str) -> Result<bool>;

    /// Create a directory inside the guest.
    async fn create_directory(&self, path: &str) -> Result<()>;
}
