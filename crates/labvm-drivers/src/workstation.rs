//! VMware Workstation driver built on `vmrun -T ws`.
//!
//! The same driver serves the `workstation` family (vmrun on this machine)
//! and the `remote_workstation` family (vmrun on another host over ssh).

use crate::command::{Runner, Transport};
use crate::settings::DriverSettings;
use async_trait::async_trait;
use labvm_core::{
    Credential, Driver, DriverContext, DriverKind, ExecResult, Result, VmError,
};
use std::path::Path;
use std::sync::Arc;

/// Driver for VMs managed by `vmrun`.
#[derive(Debug)]
pub struct WorkstationDriver {
    runner: Runner,
    id: String,
    vmx: String,
    guest: Option<Credential>,
    windows: bool,
}

impl WorkstationDriver {
    /// Build the local driver.
    ///
    /// # Errors
    /// Returns [`VmError::Config`] if no `.vmx` location is configured.
    pub fn local(ctx: DriverContext<'_>, settings: Arc<DriverSettings>) -> Result<Self> {
        Self::build(ctx, Transport::Local, settings)
    }

    /// Build the ssh-backed driver.
    ///
    /// # Errors
    /// Returns [`VmError::Config`] if no location or remote host is
    /// configured.
    pub fn remote(ctx: DriverContext<'_>, settings: Arc<DriverSettings>) -> Result<Self> {
        let transport = Transport::remote(ctx.config)?;
        Self::build(ctx, transport, settings)
    }

    fn build(
        ctx: DriverContext<'_>,
        transport: Transport,
        settings: Arc<DriverSettings>,
    ) -> Result<Self> {
        let config = ctx.config;
        if config.location.trim().is_empty() {
            return Err(VmError::Config(format!(
                "{} needs the path of the .vmx file as location",
                config.driver
            )));
        }
        Ok(Self {
            runner: Runner::new(config.driver, transport, settings),
            id: config.id.clone(),
            vmx: config.location.clone(),
            guest: config.primary_credential().cloned(),
            windows: config.os.as_deref() == Some("windows"),
        })
    }

    fn host_args(&self, operation: &str, extra: &[&str]) -> Vec<String> {
        let mut args = vec!["-T".to_string(), "ws".to_string(), operation.to_string()];
        args.push(self.vmx.clone());
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    fn guest_args(&self, operation: &'static str, extra: &[&str]) -> Result<Vec<String>> {
        let guest = self.guest.as_ref().ok_or_else(|| {
            VmError::Config(format!("{operation} needs guest credentials for {}", self.id))
        })?;
        let mut args = vec![
            "-T".to_string(),
            "ws".to_string(),
            "-gu".to_string(),
            guest.user.clone(),
            "-gp".to_string(),
            guest.pass.clone(),
            operation.to_string(),
            self.vmx.clone(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Ok(args)
    }

    async fn vmrun(&self, args: Vec<String>) -> Result<String> {
        self.runner.run(&self.runner.settings().vmrun, &args).await
    }

    fn staging_path(&self, file: &str) -> String {
        let name = Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transfer".to_string());
        format!("{}/labvm-{}-{}", self.runner.settings().remote_tmp, self.id, name)
    }

    async fn discard_staged(&self, staged: &str) {
        if let Err(e) = self.runner.remove_remote(staged).await {
            tracing::warn!(vm_id = %self.id, path = staged, error = %e, "Failed to remove staged file");
        }
    }

    fn is_remote(&self) -> bool {
        matches!(self.runner.transport(), Transport::Ssh { .. })
    }
}

/// Parse `vmrun listSnapshots` output.
pub fn parse_snapshot_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Total snapshots"))
        .map(str::to_string)
        .collect()
}

/// Whether `vmrun list` output includes the given `.vmx`.
pub fn list_contains(output: &str, vmx: &str) -> bool {
    output
        .lines()
        .skip_while(|line| line.starts_with("Total running VMs"))
        .any(|line| line.trim() == vmx)
}

#[async_trait]
impl Driver for WorkstationDriver {
    fn kind(&self) -> DriverKind {
        if self.is_remote() {
            DriverKind::RemoteWorkstation
        } else {
            DriverKind::Workstation
        }
    }

    async fn is_running(&self) -> Result<bool> {
        let output = self.vmrun(vec!["-T".into(), "ws".into(), "list".into()]).await?;
        Ok(list_contains(&output, &self.vmx))
    }

    async fn current_location(&self) -> Result<String> {
        Ok(self.vmx.clone())
    }

    async fn start(&self) -> Result<()> {
        self.vmrun(self.host_args("start", &["nogui"])).await.map(drop)
    }

    async fn stop(&self) -> Result<()> {
        self.vmrun(self.host_args("stop", &["nogui"])).await.map(drop)
    }

    async fn pause(&self) -> Result<()> {
        self.vmrun(self.host_args("pause", &[])).await.map(drop)
    }

    async fn suspend(&self) -> Result<()> {
        self.vmrun(self.host_args("suspend", &["nogui"])).await.map(drop)
    }

    async fn resume(&self) -> Result<()> {
        self.vmrun(self.host_args("unpause", &[])).await.map(drop)
    }

    async fn reset(&self) -> Result<()> {
        self.vmrun(self.host_args("reset", &["nogui"])).await.map(drop)
    }

    async fn query_snapshots(&self) -> Result<Vec<String>> {
        let output = self.vmrun(self.host_args("listSnapshots", &[])).await?;
        Ok(parse_snapshot_list(&output))
    }

    async fn create_snapshot(&self, name: &str) -> Result<()> {
        self.vmrun(self.host_args("snapshot", &[name])).await.map(drop)
    }

    async fn revert_snapshot(&self, name: &str) -> Result<()> {
        self.vmrun(self.host_args("revertToSnapshot", &[name])).await.map(drop)
    }

    async fn delete_snapshot(&self, name: &str) -> Result<()> {
        self.vmrun(self.host_args("deleteSnapshot", &[name])).await.map(drop)
    }

    async fn copy_to(&self, from: &str, to: &str) -> Result<()> {
        if self.is_remote() {
            let staged = self.staging_path(from);
            let args = self.guest_args("copyFileFromHostToGuest", &[staged.as_str(), to])?;
            self.runner.upload(from, &staged).await?;
            let result = self.vmrun(args).await.map(drop);
            self.discard_staged(&staged).await;
            result
        } else {
            let args = self.guest_args("copyFileFromHostToGuest", &[from, to])?;
            self.vmrun(args).await.map(drop)
        }
    }

    async fn copy_from(&self, from: &str, to: &str) -> Result<()> {
        if self.is_remote() {
            let staged = self.staging_path(from);
            let args = self.guest_args("copyFileFromGuestToHost", &[from, staged.as_str()])?;
            let result = match self.vmrun(args).await {
                Ok(_) => self.runner.download(&staged, to).await,
                Err(e) => Err(e),
            };
            self.discard_staged(&staged).await;
            result
        } else {
            let args = self.guest_args("copyFileFromGuestToHost", &[from, to])?;
            self.vmrun(args).await.map(drop)
        }
    }

    async fn run_command(&self, command: &str) -> Result<ExecResult> {
        // an empty interpreter makes vmrun run the script as a batch file
        let interpreter = if self.windows { "" } else { "/bin/sh" };
        let args = self.guest_args("runScriptInGuest", &[interpreter, command])?;
        self.runner.exec(&self.runner.settings().vmrun, &args).await
    }

    async fn check_file_exists(&self, path: &str) -> Result<bool> {
        let args = self.guest_args("fileExistsInGuest", &[path])?;
        let output = self.runner.exec(&self.runner.settings().vmrun, &args).await?;
        if output.stdout.contains("The file exists") {
            Ok(true)
        } else if output.stdout.contains("does not exist") {
            Ok(false)
        } else {
            self.runner.check(output).map(|_| false)
        }
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let args = self.guest_args("createDirectoryInGuest", &[path])?;
        self.vmrun(args).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labvm_core::{ConfigRecord, VmConfig};

    fn driver(record: ConfigRecord) -> Result<WorkstationDriver> {
        let config = VmConfig::from_record(&record)?;
        let ctx = DriverContext {
            config: &config,
            record: &record,
            blob: None,
        };
        let settings = Arc::new(DriverSettings::default());
        match config.driver {
            DriverKind::RemoteWorkstation => WorkstationDriver::remote(ctx, settings),
            _ => WorkstationDriver::local(ctx, settings),
        }
    }

    fn base() -> ConfigRecord {
        ConfigRecord::new()
            .set("id", "xp")
            .set("driver", "workstation")
            .set("location", "/vms/xp/xp.vmx")
    }

    fn with_guest(record: ConfigRecord) -> ConfigRecord {
        record.set(
            "credentials",
            serde_yaml::from_str::<serde_yaml::Value>("[{user: admin, pass: s3cr3t}]").unwrap(),
        )
    }

    #[test]
    fn test_location_required() {
        let record = ConfigRecord::new().set("id", "xp").set("driver", "workstation");
        assert!(matches!(driver(record), Err(VmError::Config(_))));
    }

    #[test]
    fn test_host_args() {
        let driver = driver(base()).unwrap();
        assert_eq!(driver.kind(), DriverKind::Workstation);
        assert_eq!(
            driver.host_args("start", &["nogui"]),
            vec!["-T", "ws", "start", "/vms/xp/xp.vmx", "nogui"]
        );
        assert_eq!(
            driver.host_args("revertToSnapshot", &["clean"]),
            vec!["-T", "ws", "revertToSnapshot", "/vms/xp/xp.vmx", "clean"]
        );
    }

    #[test]
    fn test_guest_args_need_credentials() {
        let driver_without = driver(base()).unwrap();
        assert!(matches!(
            driver_without.guest_args("fileExistsInGuest", &["/etc/passwd"]),
            Err(VmError::Config(_))
        ));

        let driver = driver(with_guest(base())).unwrap();
        assert_eq!(
            driver.guest_args("fileExistsInGuest", &["/etc/passwd"]).unwrap(),
            vec![
                "-T",
                "ws",
                "-gu",
                "admin",
                "-gp",
                "s3cr3t",
                "fileExistsInGuest",
                "/vms/xp/xp.vmx",
                "/etc/passwd"
            ]
        );
    }

    #[test]
    fn test_remote_variant() {
        let record = with_guest(base())
            .set("driver", "remote_workstation")
            .set("user", "lab")
            .set("host", "ws01");
        let driver = driver(record).unwrap();
        assert_eq!(driver.kind(), DriverKind::RemoteWorkstation);
        assert_eq!(driver.staging_path("C:/files/payload.exe"), "/tmp/labvm-xp-payload.exe");
        assert_eq!(driver.staging_path("/data/report.txt"), "/tmp/labvm-xp-report.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remote_copies_remove_staged_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("labvm-staging-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let log = dir.join("calls.log");
        std::fs::remove_file(&log).ok();
        let tool = dir.join("record-tool");
        std::fs::write(
            &tool,
            format!("#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let record = with_guest(base())
            .set("driver", "remote_workstation")
            .set("user", "lab")
            .set("host", "ws01");
        let config = VmConfig::from_record(&record).unwrap();
        let tool = tool.display().to_string();
        let settings = DriverSettings {
            ssh: tool.clone(),
            scp: tool,
            ..DriverSettings::default()
        };
        let driver = WorkstationDriver::remote(
            DriverContext {
                config: &config,
                record: &record,
                blob: None,
            },
            Arc::new(settings),
        )
        .unwrap();

        driver.copy_to("/data/payload.exe", "C:/payload.exe").await.unwrap();
        driver.copy_from("C:/report.txt", "/data/report.txt").await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(calls.len(), 6, "{calls:?}");
        assert!(calls[0].ends_with("/data/payload.exe lab@ws01:/tmp/labvm-xp-payload.exe"));
        assert!(calls[1].contains("'copyFileFromHostToGuest'"));
        assert!(calls[2].ends_with("'rm' '-f' '--' '/tmp/labvm-xp-payload.exe'"));
        assert!(calls[3].contains("'copyFileFromGuestToHost'"));
        assert!(calls[4].ends_with("lab@ws01:/tmp/labvm-xp-report.txt /data/report.txt"));
        assert!(calls[5].ends_with("'rm' '-f' '--' '/tmp/labvm-xp-report.txt'"));
    }

    #[test]
    fn test_remote_requires_host() {
        let record = base().set("driver", "remote_workstation");
        assert!(matches!(driver(record), Err(VmError::Config(_))));
    }

    #[test]
    fn test_parse_snapshot_list() {
        let output = "Total snapshots: 3\nclean\nbap\n  ie7 patched  \n";
        assert_eq!(parse_snapshot_list(output), vec!["clean", "bap", "ie7 patched"]);
        assert!(parse_snapshot_list("Total snapshots: 0\n").is_empty());
    }

    #[test]
    fn test_list_contains() {
        let output = "Total running VMs: 2\n/vms/xp/xp.vmx\n/vms/other/other.vmx\n";
        assert!(list_contains(output, "/vms/xp/xp.vmx"));
        assert!(!list_contains(output, "/vms/xp"));
        assert!(!list_contains("Total running VMs: 0\n", "/vms/xp/xp.vmx"));
    }

    #[tokio::test]
    #[ignore = "requires VMware Workstation and a registered VM"]
    async fn test_live_snapshot_listing() {
        let vmx = std::env::var("LABVM_TEST_VMX").unwrap_or_else(|_| "/vms/xp/xp.vmx".into());
        let driver = driver(base().set("location", vmx.as_str())).unwrap();
        let snapshots = driver.query_snapshots().await.expect("listSnapshots failed");
        println!("snapshots: {snapshots:?}");
    }
}
