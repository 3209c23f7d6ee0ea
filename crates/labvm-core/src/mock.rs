//! Recording driver used by unit tests.

use crate::driver::{Driver, DriverKind, ExecResult};
use crate::error::{Result, VmError};
use crate::registry::DriverRegistry;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Shared view of what a [`MockDriver`] was asked to do.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
    snapshots: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn set_snapshots(&self, names: &[&str]) {
        *self.snapshots.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
    }
}

pub struct MockDriver {
    kind: DriverKind,
    log: CallLog,
}

impl MockDriver {
    pub fn new(kind: DriverKind, log: CallLog) -> Self {
        Self { kind, log }
    }

    fn record(&self, operation: &'static str, detail: Option<String>) -> Result<()> {
        let entry = match detail {
            Some(detail) => format!("{operation}:{detail}"),
            None => operation.to_string(),
        };
        self.log.calls.lock().unwrap().push(entry);
        if self.log.failing.lock().unwrap().contains(operation) {
            return Err(VmError::Backend {
                driver: self.kind,
                message: format!("{operation} failed"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn is_running(&self) -> Result<bool> {
        self.record("is_running", None)?;
        let calls = self.log.calls();
        let last_start = calls.iter().rposition(|c| c == "start");
        let last_stop = calls.iter().rposition(|c| c == "stop");
        Ok(last_start > last_stop)
    }

    async fn current_location(&self) -> Result<String> {
        self.record("current_location", None)?;
        Ok("/migrated/vm.vmx".to_string())
    }

    async fn start(&self) -> Result<()> {
        self.record("start", None)
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop", None)
    }

    async fn pause(&self) -> Result<()> {
        self.record("pause", None)
    }

    async fn suspend(&self) -> Result<()> {
        self.record("suspend", None)
    }

    async fn resume(&self) -> Result<()> {
        self.record("resume", None)
    }

    async fn reset(&self) -> Result<()> {
        self.record("reset", None)
    }

    async fn query_snapshots(&self) -> Result<Vec<String>> {
        self.record("query_snapshots", None)?;
        Ok(self.log.snapshots.lock().unwrap().clone())
    }

    async fn create_snapshot(&self, name: &str) -> Result<()> {
        self.record("create_snapshot", Some(name.to_string()))
    }

    async fn revert_snapshot(&self, name: &str) -> Result<()> {
        self.record("revert_snapshot", Some(name.to_string()))
    }

    async fn delete_snapshot(&self, name: &str) -> Result<()> {
        self.record("delete_snapshot", Some(name.to_string()))
    }

    async fn copy_to(&self, from: &str, to: &str) -> Result<()> {
        self.record("copy_to", Some(format!("{from}->{to}")))
    }

    async fn copy_from(&self, from: &str, to: &str) -> Result<()> {
        self.record("copy_from", Some(format!("{from}->{to}")))
    }

    async fn run_command(&self, command: &str) -> Result<ExecResult> {
        self.record("run_command", Some(command.to_string()))?;
        Ok(ExecResult {
            exit_code: 0,
            stdout: command.to_string(),
            stderr: String::new(),
        })
    }

    async fn check_file_exists(&self, path: &str) -> Result<bool> {
        self.record("check_file_exists", Some(path.to_string()))?;
        Ok(path.starts_with('/'))
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        self.record("create_directory", Some(path.to_string()))
    }
}

/// A registry whose every family resolves to a [`MockDriver`] sharing `log`.
pub fn registry(log: &CallLog) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    for kind in DriverKind::ALL {
        let log = log.clone();
        registry.register(kind, move |ctx| {
            Ok(Box::new(MockDriver::new(ctx.config.driver, log.clone())) as Box<dyn Driver>)
        });
    }
    registry
}
