//! ESXi driver: `vim-cmd vmsvc/...` over ssh.
//!
//! Guest operations need VMware Tools APIs that `vim-cmd` does not expose,
//! so they report [`VmError::Unsupported`].

use crate::command::{Runner, Transport};
use crate::settings::DriverSettings;
use async_trait::async_trait;
use labvm_core::{Driver, DriverContext, DriverKind, ExecResult, Result, VmError};
use std::sync::Arc;

const VIM_CMD: &str = "vim-cmd";

/// Driver for VMs on a standalone ESXi host.
///
/// The VM id is the host's numeric vmid.
#[derive(Debug)]
pub struct RemoteEsxiDriver {
    runner: Runner,
    vmid: String,
}

/// One entry of `vmsvc/snapshot.get` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsxiSnapshot {
    /// Snapshot name
    pub name: String,
    /// Numeric snapshot id used by `snapshot.revert` / `snapshot.remove`
    pub id: String,
}

impl RemoteEsxiDriver {
    /// Build the ssh-backed driver.
    ///
    /// # Errors
    /// Returns [`VmError::Config`] if no remote host is configured.
    pub fn new(ctx: DriverContext<'_>, settings: Arc<DriverSettings>) -> Result<Self> {
        let transport = Transport::remote(ctx.config)?;
        Ok(Self {
            runner: Runner::new(DriverKind::RemoteEsxi, transport, settings),
            vmid: ctx.config.id.clone(),
        })
    }

    fn args(&self, command: &str, extra: &[&str]) -> Vec<String> {
        let mut args = vec![format!("vmsvc/{command}"), self.vmid.clone()];
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    async fn vim_cmd(&self, command: &str, extra: &[&str]) -> Result<String> {
        self.runner.run(VIM_CMD, &self.args(command, extra)).await
    }

    async fn snapshots(&self) -> Result<Vec<EsxiSnapshot>> {
        let output = self.vim_cmd("snapshot.get", &[]).await?;
        Ok(parse_snapshots(&output))
    }

    async fn snapshot_id(&self, name: &str) -> Result<String> {
        self.snapshots()
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| VmError::Backend {
                driver: DriverKind::RemoteEsxi,
                message: format!("no snapshot named {name:?} on vm {}", self.vmid),
            })
    }
}

/// Parse the snapshot tree printed by `vim-cmd vmsvc/snapshot.get`.
pub fn parse_snapshots(output: &str) -> Vec<EsxiSnapshot> {
    let mut snapshots = Vec::new();
    let mut name: Option<String> = None;
    for line in output.lines() {
        let line = line.trim_start_matches(|c: char| c == '-' || c == '|' || c.is_whitespace());
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "Snapshot Name" => name = Some(value.trim().to_string()),
            "Snapshot Id" => {
                if let Some(name) = name.take() {
                    snapshots.push(EsxiSnapshot {
                        name,
                        id: value.trim().to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    snapshots
}

/// Pull `vmPathName` out of `vmsvc/get.filelayout` output.
pub fn parse_vm_path(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == "vmPathName")
            .then(|| value.trim().trim_end_matches(',').trim_matches('"').to_string())
    })
}

#[async_trait]
impl Driver for RemoteEsxiDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::RemoteEsxi
    }

    async fn is_running(&self) -> Result<bool> {
        let output = self.vim_cmd("power.getstate", &[]).await?;
        Ok(output.lines().any(|line| line.trim() == "Powered on"))
    }

    async fn current_location(&self) -> Result<String> {
        let output = self.vim_cmd("get.filelayout", &[]).await?;
        parse_vm_path(&output).ok_or_else(|| VmError::Backend {
            driver: DriverKind::RemoteEsxi,
            message: format!("no vmPathName reported for vm {}", self.vmid),
        })
    }

    async fn start(&self) -> Result<()> {
        self.vim_cmd("power.on", &[]).await.map(drop)
    }

    async fn stop(&self) -> Result<()> {
        self.vim_cmd("power.off", &[]).await.map(drop)
    }

    async fn pause(&self) -> Result<()> {
        Err(self.runner.unsupported("pause"))
    }

    async fn suspend(&self) -> Result<()> {
        self.vim_cmd("power.suspend", &[]).await.map(drop)
    }

    async fn resume(&self) -> Result<()> {
        // powering on a suspended VM resumes it
        self.vim_cmd("power.on", &[]).await.map(drop)
    }

    async fn reset(&self) -> Result<()> {
        self.vim_cmd("power.reset", &[]).await.map(drop)
    }

    async fn query_snapshots(&self) -> Result<Vec<String>> {
        Ok(self.snapshots().await?.into_iter().map(|s| s.name).collect())
    }

    async fn create_snapshot(&self, name: &str) -> Result<()> {
        self.vim_cmd("snapshot.create", &[name]).await.map(drop)
    }

    async fn revert_snapshot(&self, name: &str) -> Result<()> {
        let id = self.snapshot_id(name).await?;
        self.vim_cmd("snapshot.revert", &[id.as_str(), "1"])
            .await
            .map(drop)
    }

    async fn delete_snapshot(&self, name: &str) -> Result<()> {
        let id = self.snapshot_id(name).await?;
        self.vim_cmd("snapshot.remove", &[id.as_str()]).await.map(drop)
    }

    async fn copy_to(&self, _from: &str, _to: &str) -> Result<()> {
        Err(self.runner.unsupported("copy_to"))
    }

    async fn copy_from(&self, _from: &str, _to: &str) -> Result<()> {
        Err(self.runner.unsupported("copy_from"))
    }

    async fn run_command(&self, _command: &str) -> Result<ExecResult> {
        Err(self.runner.unsupported("run_command"))
    }

    async fn check_file_exists(&self, _path: &str) -> Result<bool> {
        Err(self.runner.unsupported("check_file_exists"))
    }

    async fn create_directory(&self, _path: &str) -> Result<()> {
        Err(self.runner.unsupported("create_directory"))
    }
}
