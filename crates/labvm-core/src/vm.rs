//! Vm type - the uniform handle for one lab VM.

use crate::config::{ConfigRecord, Credential, RemoteConnection, VmConfig};
use crate::driver::{Driver, DriverKind, ExecResult};
use crate::error::Result;
use crate::extension::{Extension, ExtensionRegistry};
use crate::registry::DriverRegistry;
use crate::snapshot::{union_tags, Snapshot, SnapshotReport};
use std::collections::BTreeSet;
use std::fmt;

/// Browser launcher used on Windows guests.
pub const WINDOWS_BROWSER: &str = r#""C:\program files\internet explorer\iexplore.exe""#;

/// Browser launcher used on every other guest.
pub const GENERIC_BROWSER: &str = "firefox";

/// One lab VM bound to exactly one backend driver.
///
/// Configuration is validated once in [`Vm::new`] and is read-only
/// afterwards. The driver is built at the same time and never replaced;
/// every runtime operation is forwarded to it.
pub struct Vm {
    config: VmConfig,
    driver: Box<dyn Driver>,
    extensions: Vec<Box<dyn Extension>>,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("id", &self.config.id)
            .field("hostname", &self.config.hostname)
            .field("driver", &self.driver.kind())
            .field("extensions", &self.extension_names())
            .finish()
    }
}

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.config.hostname)
    }
}

impl Vm {
    /// Build a VM from a configuration record.
    ///
    /// Construction is all-or-nothing: the record is validated and
    /// sanitized, then the registry builds the driver.
    ///
    /// # Errors
    /// Returns a validation error if the record is invalid, names an
    /// unknown or unregistered driver, or requests any extension (use
    /// [`Vm::with_extensions`] for that).
    pub fn new(record: &ConfigRecord, drivers: &DriverRegistry) -> Result<Self> {
        Self::with_extensions(record, drivers, &ExtensionRegistry::new())
    }

    /// Build a VM and attach the extensions its configuration names.
    ///
    /// # Errors
    /// As [`Vm::new`], plus an error for any extension that is unknown or
    /// fails to attach.
    pub fn with_extensions(
        record: &ConfigRecord,
        drivers: &DriverRegistry,
        extensions: &ExtensionRegistry,
    ) -> Result<Self> {
        let config = VmConfig::from_record(record)?;
        let driver = drivers.resolve(&config, record)?;
        let extensions = extensions.attach(&config, record)?;

        tracing::info!(
            vm_id = %config.id,
            hostname = %config.hostname,
            driver = %config.driver,
            extensions = extensions.len(),
            "Created VM"
        );

        Ok(Self {
            config,
            driver,
            extensions,
        })
    }

    /// Unique identifier.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Display / connection name.
    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// What is installed on the VM.
    pub fn description(&self) -> Option<&str> {
        self.config.description.as_deref()
    }

    /// Free-form notes.
    pub fn notes(&self) -> Option<&str> {
        self.config.notes.as_deref()
    }

    /// The driver family this VM resolved to.
    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    /// Normalized driver type string.
    pub fn driver_type(&self) -> &'static str {
        self.config.driver_type()
    }

    /// Location as configured. See [`Vm::current_location`] for where the
    /// backend says the VM actually is.
    pub fn location(&self) -> &str {
        &self.config.location
    }

    /// Category such as `qa` or `vulnerable`; `unspecified` by default.
    pub fn class(&self) -> &str {
        &self.config.class
    }

    /// Whether guest tools are installed, if known.
    pub fn tools(&self) -> Option<bool> {
        self.config.tools
    }

    /// Guest operating system.
    pub fn os(&self) -> Option<&str> {
        self.config.os.as_deref()
    }

    /// Guest architecture.
    pub fn arch(&self) -> Option<&str> {
        self.config.arch.as_deref()
    }

    /// Guest logins; drivers use the first.
    pub fn credentials(&self) -> &[Credential] {
        &self.config.credentials
    }

    /// Remote host details, for remote drivers.
    pub fn remote(&self) -> Option<&RemoteConnection> {
        self.config.remote.as_ref()
    }

    /// Tags describing the base machine.
    pub fn machine_tags(&self) -> &[String] {
        &self.config.machine_tags
    }

    /// Configured snapshots (not what the backend holds).
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.config.snapshots
    }

    /// The validated construction-time configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Machine tags together with the tags of one configured snapshot.
    ///
    /// Returns `None` if no snapshot of that name is configured.
    pub fn tags_at(&self, snapshot: &str) -> Option<BTreeSet<String>> {
        self.config
            .snapshots
            .iter()
            .find(|s| s.name == snapshot)
            .map(|s| union_tags(&self.config.machine_tags, s))
    }

    /// Names of the attached extensions, in attachment order.
    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// Look up an attached extension by name.
    pub fn extension(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    /// Look up the first attached extension of a concrete type.
    pub fn extension_as<T: Extension + 'static>(&self) -> Option<&T> {
        self.extensions
            .iter()
            .find_map(|e| e.as_any().downcast_ref::<T>())
    }

    /// Whether the backend reports the VM as running.
    pub async fn is_running(&self) -> Result<bool> {
        self.driver.is_running().await
    }

    /// Where the backend says the VM currently is.
    pub async fn current_location(&self) -> Result<String> {
        self.driver.current_location().await
    }

    /// Power the VM on.
    pub async fn start(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Starting VM");
        self.driver.start().await
    }

    /// Power the VM off.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Stopping VM");
        self.driver.stop().await
    }

    /// Pause the VM in memory.
    pub async fn pause(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Pausing VM");
        self.driver.pause().await
    }

    /// Suspend the VM to disk.
    pub async fn suspend(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Suspending VM");
        self.driver.suspend().await
    }

    /// Resume a paused or suspended VM.
    pub async fn resume(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Resuming VM");
        self.driver.resume().await
    }

    /// Hard-reset the VM.
    pub async fn reset(&self) -> Result<()> {
        tracing::warn!(vm_id = %self.id(), "Resetting VM");
        self.driver.reset().await
    }

    /// Snapshots the backend currently holds.
    pub async fn query_snapshots(&self) -> Result<Vec<String>> {
        self.driver.query_snapshots().await
    }

    /// Take a snapshot under `name`.
    pub async fn create_snapshot(&self, name: &str) -> Result<()> {
        tracing::info!(vm_id = %self.id(), snapshot = name, "Creating snapshot");
        self.driver.create_snapshot(name).await
    }

    /// Revert to the snapshot `name`.
    pub async fn revert_snapshot(&self, name: &str) -> Result<()> {
        tracing::info!(vm_id = %self.id(), snapshot = name, "Reverting snapshot");
        self.driver.revert_snapshot(name).await
    }

    /// Delete the snapshot `name`.
    pub async fn delete_snapshot(&self, name: &str) -> Result<()> {
        tracing::info!(vm_id = %self.id(), snapshot = name, "Deleting snapshot");
        self.driver.delete_snapshot(name).await
    }

    /// Revert to a snapshot, then start the VM.
    ///
    /// Not atomic. If the revert fails, start is not attempted. If start
    /// fails, the VM stays reverted but stopped and the error is returned.
    pub async fn revert_and_start(&self, name: &str) -> Result<()> {
        self.revert_snapshot(name).await?;
        self.start().await
    }

    /// Compare backend snapshots with configured ones, by name.
    ///
    /// Mismatches are logged as warnings, never treated as errors.
    pub async fn reconcile_snapshots(&self) -> Result<SnapshotReport> {
        let reported = self.driver.query_snapshots().await?;
        let report = SnapshotReport::reconcile(&self.config.snapshots, &reported);
        for name in &report.unconfigured {
            tracing::warn!(vm_id = %self.id(), snapshot = %name, "Backend snapshot has no configuration entry");
        }
        for name in &report.missing {
            tracing::warn!(vm_id = %self.id(), snapshot = %name, "Configured snapshot not found on backend");
        }
        Ok(report)
    }

    /// Copy a file from the host into the guest.
    pub async fn copy_to(&self, from: &str, to: &str) -> Result<()> {
        tracing::debug!(vm_id = %self.id(), from, to, "Copying file to guest");
        self.driver.copy_to(from, to).await
    }

    /// Copy a file from the guest to the host.
    pub async fn copy_from(&self, from: &str, to: &str) -> Result<()> {
        tracing::debug!(vm_id = %self.id(), from, to, "Copying file from guest");
        self.driver.copy_from(from, to).await
    }

    /// Run a command in the guest. The command is passed through as-is.
    pub async fn run_command(&self, command: &str) -> Result<ExecResult> {
        tracing::debug!(vm_id = %self.id(), command, "Running guest command");
        self.driver.run_command(command).await
    }

    /// Whether `path` exists in the guest.
    pub async fn check_file_exists(&self, path: &str) -> Result<bool> {
        self.driver.check_file_exists(path).await
    }

    /// Create a directory in the guest.
    pub async fn create_directory(&self, path: &str) -> Result<()> {
        self.driver.create_directory(path).await
    }

    /// The command [`Vm::open_uri`] runs for `uri`.
    pub fn browser_command(&self, uri: &str) -> String {
        // uri is not sanitized; it is expected to carry URL punctuation
        if self.config.os.as_deref() == Some("windows") {
            format!("{WINDOWS_BROWSER} {uri}")
        } else {
            format!("{GENERIC_BROWSER} {uri}")
        }
    }

    /// Open a URI in the guest's browser.
    pub async fn open_uri(&self, uri: &str) -> Result<ExecResult> {
        let command = self.browser_command(uri);
        self.run_command(&command).await
    }
}
