//! VirtualBox driver built on `VBoxManage`.

use crate::command::{Runner, Transport};
use crate::settings::DriverSettings;
use async_trait::async_trait;
use labvm_core::{Credential, Driver, DriverContext, DriverKind, ExecResult, Result, VmError};
use std::sync::Arc;

/// Driver for VMs registered with the local VirtualBox installation.
///
/// The VM is addressed by its id, which must match the VirtualBox VM name
/// (or UUID).
#[derive(Debug)]
pub struct VirtualBoxDriver {
    runner: Runner,
    name: String,
    guest: Option<Credential>,
    windows: bool,
}

impl VirtualBoxDriver {
    /// Build the driver. Nothing is spawned until an operation runs.
    pub fn new(ctx: DriverContext<'_>, settings: Arc<DriverSettings>) -> Result<Self> {
        let config = ctx.config;
        Ok(Self {
            runner: Runner::new(DriverKind::VirtualBox, Transport::Local, settings),
            name: config.id.clone(),
            guest: config.primary_credential().cloned(),
            windows: config.os.as_deref() == Some("windows"),
        })
    }

    fn args(&self, command: &str, extra: &[&str]) -> Vec<String> {
        let mut args = vec![command.to_string(), self.name.clone()];
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    fn guest_args(&self, operation: &'static str, extra: &[&str]) -> Result<Vec<String>> {
        let guest = self.guest.as_ref().ok_or_else(|| {
            VmError::Config(format!("{operation} needs guest credentials for {}", self.name))
        })?;
        let mut args = vec![
            "guestcontrol".to_string(),
            self.name.clone(),
            operation.to_string(),
            "--username".to_string(),
            guest.user.clone(),
            "--password".to_string(),
            guest.pass.clone(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Ok(args)
    }

    fn command_args(&self, command: &str) -> Result<Vec<String>> {
        let (exe, argv0, flag) = if self.windows {
            (r"C:\Windows\System32\cmd.exe", "cmd.exe", "/c")
        } else {
            ("/bin/sh", "sh", "-c")
        };
        self.guest_args(
            "run",
            &[
                "--exe",
                exe,
                "--wait-stdout",
                "--wait-stderr",
                "--",
                argv0,
                flag,
                command,
            ],
        )
    }

    async fn vboxmanage(&self, args: Vec<String>) -> Result<String> {
        self.runner.run(&self.runner.settings().vboxmanage, &args).await
    }
}

/// Read one `key="value"` line from `--machinereadable` output.
pub fn machine_readable_value(output: &str, key: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().trim_matches('"').to_string())
    })
}

/// Parse `VBoxManage snapshot <vm> list --machinereadable` output.
///
/// Nested snapshots appear as `SnapshotName-1`, `SnapshotName-1-1`, ...
pub fn parse_snapshot_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let suffix = key.trim().strip_prefix("SnapshotName")?;
            (suffix.is_empty() || suffix.starts_with('-'))
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .collect()
}

/// Whether a failed `guestcontrol stat` says the path is absent, as opposed
/// to the guest session or the VM itself being unavailable.
pub fn stat_reports_missing(output: &ExecResult) -> bool {
    const MISSING: [&str; 4] = [
        "does not exist",
        "No such file or directory",
        "VERR_FILE_NOT_FOUND",
        "VERR_PATH_NOT_FOUND",
    ];
    MISSING
        .iter()
        .any(|marker| output.stderr.contains(marker) || output.stdout.contains(marker))
}

/// Whether `VBoxManage list runningvms` output includes the VM.
pub fn running_list_contains(output: &str, name: &str) -> bool {
    let quoted = format!("\"{name}\"");
    output.lines().any(|line| {
        let line = line.trim();
        line.starts_with(&quoted) || line.ends_with(&format!("{{{name}}}"))
    })
}

#[async_trait]
impl Driver for VirtualBoxDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::VirtualBox
    }

    async fn is_running(&self) -> Result<bool> {
        let output = self
            .vboxmanage(vec!["list".into(), "runningvms".into()])
            .await?;
        Ok(running_list_contains(&output, &self.name))
    }

    async fn current_location(&self) -> Result<String> {
        let output = self
            .vboxmanage(self.args("showvminfo", &["--machinereadable"]))
            .await?;
        machine_readable_value(&output, "CfgFile").ok_or_else(|| VmError::Backend {
            driver: DriverKind::VirtualBox,
            message: format!("no CfgFile reported for {}", self.name),
        })
    }

    async fn start(&self) -> Result<()> {
        self.vboxmanage(self.args("startvm", &["--type", "headless"]))
            .await
            .map(drop)
    }

    async fn stop(&self) -> Result<()> {
        self.vboxmanage(self.args("controlvm", &["poweroff"])).await.map(drop)
    }

    async fn pause(&self) -> Result<()> {
        self.vboxmanage(self.args("controlvm", &["pause"])).await.map(drop)
    }

    async fn suspend(&self) -> Result<()> {
        self.vboxmanage(self.args("controlvm", &["savestate"])).await.map(drop)
    }

    async fn resume(&self) -> Result<()> {
        self.vboxmanage(self.args("controlvm", &["resume"])).await.map(drop)
    }

    async fn reset(&self) -> Result<()> {
        self.vboxmanage(self.args("controlvm", &["reset"])).await.map(drop)
    }

    async fn query_snapshots(&self) -> Result<Vec<String>> {
        let args = self.args("snapshot", &["list", "--machinereadable"]);
        let output = self
            .runner
            .exec(&self.runner.settings().vboxmanage, &args)
            .await?;
        let none = "does not have any snapshots";
        if output.stdout.contains(none) || output.stderr.contains(none) {
            return Ok(Vec::new());
        }
        let output = self.runner.check(output)?;
        Ok(parse_snapshot_names(&output.stdout))
    }

    async fn create_snapshot(&self, name: &str) -> Result<()> {
        self.vboxmanage(self.args("snapshot", &["take", name])).await.map(drop)
    }

    async fn revert_snapshot(&self, name: &str) -> Result<()> {
        self.vboxmanage(self.args("snapshot", &["restore", name]))
            .await
            .map(drop)
    }

    async fn delete_snapshot(&self, name: &str) -> Result<()> {
        self.vboxmanage(self.args("snapshot", &["delete", name])).await.map(drop)
    }

    async fn copy_to(&self, from: &str, to: &str) -> Result<()> {
        let args = self.guest_args("copyto", &[from, to])?;
        self.vboxmanage(args).await.map(drop)
    }

    async fn copy_from(&self, from: &str, to: &str) -> Result<()> {
        let args = self.guest_args("copyfrom", &[from, to])?;
        self.vboxmanage(args).await.map(drop)
    }

    async fn run_command(&self, command: &str) -> Result<ExecResult> {
        let args = self.command_args(command)?;
        self.runner
            .exec(&self.runner.settings().vboxmanage, &args)
            .await
    }

    async fn check_file_exists(&self, path: &str) -> Result<bool> {
        let args = self.guest_args("stat", &[path])?;
        let output = self
            .runner
            .exec(&self.runner.settings().vboxmanage, &args)
            .await?;
        if output.success() {
            Ok(true)
        } else if stat_reports_missing(&output) {
            Ok(false)
        } else {
            self.runner.check(output).map(|_| false)
        }
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let args = self.guest_args("mkdir", &["--parents", path])?;
        self.vboxmanage(args).await.map(drop)
    }
}
