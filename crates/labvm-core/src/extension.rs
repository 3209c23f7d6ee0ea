//! Optional capability modules attached to a VM at construction time.
//!
//! A VM configuration may name extensions under `modifiers`. Each name must
//! resolve through an [`ExtensionRegistry`]; an unknown name or a failing
//! constructor aborts construction.

use crate::config::{ConfigRecord, VmConfig};
use crate::error::{Result, VmError};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// A capability module composed into a [`Vm`](crate::Vm).
///
/// Extensions receive the VM as an argument to their own methods; use
/// [`Vm::extension_as`](crate::Vm::extension_as) to get at the concrete type.
pub trait Extension: Send + Sync {
    /// Name the extension is registered under.
    fn name(&self) -> &str;

    /// Upcast for downcasting to the concrete extension type.
    fn as_any(&self) -> &dyn Any;
}

/// Builds an extension for one VM.
pub type ExtensionConstructor =
    Box<dyn Fn(&VmConfig, &ConfigRecord) -> Result<Box<dyn Extension>> + Send + Sync>;

/// Registry of extension constructors keyed by name.
#[derive(Default)]
pub struct ExtensionRegistry {
    constructors: BTreeMap<String, ExtensionConstructor>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("names", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExtensionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an extension constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&VmConfig, &ConfigRecord) -> Result<Box<dyn Extension>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&VmConfig, &ConfigRecord) -> Result<Box<dyn Extension>> + Send + Sync + 'static,
    {
        self.register(name, constructor);
        self
    }

    /// Whether an extension is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Build every extension the configuration asks for, in order.
    ///
    /// # Errors
    /// Returns [`VmError::UnknownExtension`] for an unregistered name and
    /// [`VmError::Extension`] if a constructor fails.
    pub fn attach(
        &self,
        config: &VmConfig,
        record: &ConfigRecord,
    ) -> Result<Vec<Box<dyn Extension>>> {
        config
            .modifiers
            .iter()
            .map(|name| {
                let constructor = self
                    .constructors
                    .get(name)
                    .ok_or_else(|| VmError::UnknownExtension(name.clone()))?;
                let extension = constructor(config, record).map_err(|e| VmError::Extension {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
                tracing::debug!(vm_id = %config.id, extension = %name, "Attached extension");
                Ok(extension)
            })
            .collect()
    }
}
