//! Driver registry: maps each [`DriverKind`] to the routine that builds it.

use crate::config::{ConfigRecord, VmConfig};
use crate::driver::{Driver, DriverKind};
use crate::error::{Result, VmError};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Everything a driver constructor gets to see.
///
/// The `config` has already passed validation when a constructor runs, so
/// sanitized fields may be used to build command lines.
#[derive(Debug, Clone, Copy)]
pub struct DriverContext<'a> {
    /// Validated configuration of the VM
    pub config: &'a VmConfig,
    /// The full configuration record the VM was built from
    pub record: &'a ConfigRecord,
    /// The family-specific opaque blob, if this family takes one
    pub blob: Option<&'a Value>,
}

/// Builds a driver for one VM.
pub type DriverConstructor =
    Box<dyn Fn(DriverContext<'_>) -> Result<Box<dyn Driver>> + Send + Sync>;

/// Registry of driver constructors, one per driver family.
#[derive(Default)]
pub struct DriverRegistry {
    constructors: BTreeMap<DriverKind, DriverConstructor>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for a driver family.
    pub fn register<F>(&mut self, kind: DriverKind, constructor: F) -> &mut Self
    where
        F: Fn(DriverContext<'_>) -> Result<Box<dyn Driver>> + Send + Sync + 'static,
    {
        if self.constructors.insert(kind, Box::new(constructor)).is_some() {
            tracing::debug!(driver = %kind, "Replaced driver constructor");
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, kind: DriverKind, constructor: F) -> Self
    where
        F: Fn(DriverContext<'_>) -> Result<Box<dyn Driver>> + Send + Sync + 'static,
    {
        self.register(kind, constructor);
        self
    }

    /// Whether a constructor is registered for `kind`.
    pub fn contains(&self, kind: DriverKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Registered driver families, in declaration order.
    pub fn kinds(&self) -> Vec<DriverKind> {
        self.constructors.keys().copied().collect()
    }

    /// Build exactly one driver for a validated configuration.
    ///
    /// # Errors
    /// Returns [`VmError::DriverUnavailable`] if nothing is registered for
    /// the configured family, or whatever the constructor fails with.
    pub fn resolve(&self, config: &VmConfig, record: &ConfigRecord) -> Result<Box<dyn Driver>> {
        let kind = config.driver;
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or(VmError::DriverUnavailable(kind))?;

        let blob = kind.blob_key().and_then(|key| config.blob(key));
        let driver = constructor(DriverContext {
            config,
            record,
            blob,
        })?;
        tracing::debug!(vm_id = %config.id, driver = %kind, "Resolved driver");
        Ok(driver)
    }
}
