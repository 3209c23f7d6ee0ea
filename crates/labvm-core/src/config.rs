//! Configuration records and their validated form.
//!
//! A [`ConfigRecord`] is the raw, ordered key/value mapping a lab VM is
//! described by. [`VmConfig::from_record`] turns it into trusted,
//! construction-time configuration, running every command-bound field
//! through the sanitizer.

use crate::driver::DriverKind;
use crate::error::{Result, VmError};
use crate::sanitize::{sanitize, sanitize_opt};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Class given to a VM whose configuration does not name one.
pub const DEFAULT_CLASS: &str = "unspecified";

/// Keys holding opaque, driver-specific configuration.
pub const BLOB_KEYS: [&str; 3] = ["platform", "fog_config", "dynagen_config"];

/// Raw configuration record for one VM.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigRecord(Mapping);

impl ConfigRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing mapping.
    pub fn from_mapping(mapping: Mapping) -> Self {
        Self(mapping)
    }

    /// Parse a single record from a YAML mapping.
    ///
    /// # Errors
    /// Returns an error if the text is not valid YAML or not a mapping.
    pub fn from_yaml(text: &str) -> Result<Self> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(mapping) => Ok(Self(mapping)),
            other => Err(VmError::Config(format!(
                "expected a mapping, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Parse a YAML sequence of records (a single mapping is also accepted).
    ///
    /// # Errors
    /// Returns an error if the text is not valid YAML or an entry is not a
    /// mapping.
    pub fn parse_many(text: &str) -> Result<Vec<Self>> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Mapping(mapping) => Ok(Self(mapping)),
                    other => Err(VmError::Config(format!(
                        "expected a mapping entry, got {}",
                        value_kind(&other)
                    ))),
                })
                .collect(),
            Value::Mapping(mapping) => Ok(vec![Self(mapping)]),
            Value::Null => Ok(Vec::new()),
            other => Err(VmError::Config(format!(
                "expected a sequence of mappings, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Set a key, returning the record for chaining.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a key.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(Value::from(key), value.into());
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up the first of several alias keys that holds a non-null value.
    pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|value| !value.is_null())
    }

    /// Look up a key as text (strings, numbers and booleans).
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        self.get_any(keys).and_then(scalar_text)
    }

    /// Borrow the underlying mapping.
    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    /// Render the record as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }
}

impl From<Mapping> for ConfigRecord {
    fn from(mapping: Mapping) -> Self {
        Self(mapping)
    }
}

/// A login usable for authenticated guest operations.
///
/// Only the first credential of a VM is used by drivers today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Guest user name
    pub user: String,
    /// Guest password
    pub pass: String,
    /// Private key file for key-based logins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyfile: Option<String>,
    /// Whether the account has administrative rights
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub admin: bool,
}

impl Credential {
    /// Create a credential from a user name and password.
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
            ..Default::default()
        }
    }

    fn from_value(index: usize, value: &Value) -> Result<Self> {
        let Value::Mapping(map) = value else {
            return Err(VmError::Config(format!(
                "credentials[{index}] must be a mapping, got {}",
                value_kind(value)
            )));
        };
        let user = sanitize(&format!("credentials[{index}].user"), map.get("user"))?;
        let pass = sanitize(&format!("credentials[{index}].pass"), map.get("pass"))?;
        let keyfile = sanitize_opt(&format!("credentials[{index}].keyfile"), map.get("keyfile"))?;
        let admin = map.get("admin").and_then(flag).unwrap_or(false);

        Ok(Self {
            user: user.unwrap_or_default(),
            pass: pass.unwrap_or_default(),
            keyfile,
            admin,
        })
    }
}

/// Connection details for VMs hosted on another machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConnection {
    /// Login user on the remote host
    pub user: Option<String>,
    /// Remote host name or address
    pub host: Option<String>,
    /// Remote ssh port
    pub port: Option<String>,
    /// Remote password (keys are preferred)
    pub pass: Option<String>,
}

impl RemoteConnection {
    fn from_record(record: &ConfigRecord) -> Result<Option<Self>> {
        let remote = Self {
            user: sanitize_opt("user", record.get("user"))?,
            host: sanitize_opt("host", record.get("host"))?,
            port: sanitize_opt("port", record.get("port"))?,
            pass: sanitize_opt("pass", record.get("pass"))?,
        };
        if remote == Self::default() {
            Ok(None)
        } else {
            Ok(Some(remote))
        }
    }

    /// `user@host` when both are known, otherwise just the host.
    pub fn destination(&self) -> Option<String> {
        match (&self.user, &self.host) {
            (Some(user), Some(host)) => Some(format!("{user}@{host}")),
            (None, Some(host)) => Some(host.clone()),
            _ => None,
        }
    }
}

/// Validated, construction-time configuration of a VM.
#[derive(Debug, Clone, PartialEq)]
pub struct VmConfig {
    /// Unique, non-empty identifier
    pub id: String,
    /// Display / connection name
    pub hostname: String,
    /// What is on the VM
    pub description: Option<String>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Selected backend family
    pub driver: DriverKind,
    /// Backend-dependent location (path or identifier)
    pub location: String,
    /// Free-form category (qa, vulnerable, ...)
    pub class: String,
    /// Whether guest tools are installed
    pub tools: Option<bool>,
    /// Guest operating system
    pub os: Option<String>,
    /// Guest architecture
    pub arch: Option<String>,
    /// Guest logins, in priority order
    pub credentials: Vec<Credential>,
    /// Remote host details (remote drivers only)
    pub remote: Option<RemoteConnection>,
    /// Opaque driver-specific blobs, passed through untouched
    pub blobs: Mapping,
    /// Tags describing the base machine
    pub machine_tags: Vec<String>,
    /// Configured snapshots with their own tags
    pub snapshots: Vec<Snapshot>,
    /// Requested extensions
    pub modifiers: Vec<String>,
}

impl VmConfig {
    /// Validate a configuration record.
    ///
    /// # Errors
    /// Returns a validation error for a missing or blank id, a missing or
    /// unknown driver type, a disallowed character in any sanitized field,
    /// or a malformed credential/tag/snapshot entry.
    pub fn from_record(record: &ConfigRecord) -> Result<Self> {
        let id = sanitize("id", record.get_any(&["id", "vmid"]))?.unwrap_or_default();
        if id.trim().is_empty() {
            return Err(VmError::InvalidId);
        }

        let hostname = record
            .text(&["hostname", "name_label"])
            .unwrap_or_else(|| id.clone());

        let driver_type = sanitize("driver", record.get("driver"))?.unwrap_or_default();
        if driver_type.trim().is_empty() {
            return Err(VmError::MissingDriver);
        }
        let driver = DriverKind::parse(&driver_type)?;

        let location = sanitize("location", record.get("location"))?.unwrap_or_default();
        let class = sanitize_opt("class", record.get_any(&["class", "type"]))?
            .unwrap_or_else(|| DEFAULT_CLASS.to_string());

        let credentials = match record.get("credentials") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Credential::from_value(i, item))
                .collect::<Result<_>>()?,
            Some(other) => {
                return Err(VmError::Config(format!(
                    "credentials must be a sequence, got {}",
                    value_kind(other)
                )))
            }
        };

        let remote = RemoteConnection::from_record(record)?;

        let mut blobs = Mapping::new();
        for key in BLOB_KEYS {
            if let Some(value) = record.get(key).filter(|v| !v.is_null()) {
                blobs.insert(Value::from(key), value.clone());
            }
        }

        Ok(Self {
            id,
            hostname,
            description: record.text(&["description", "name_description"]),
            notes: record.text(&["notes"]),
            driver,
            location,
            class,
            tools: record.get("tools").and_then(flag),
            os: record.text(&["os"]),
            arch: record.text(&["arch"]),
            credentials,
            remote,
            blobs,
            machine_tags: string_list("machine_tags", record.get_any(&["machine_tags", "machineTags"]))?,
            snapshots: Snapshot::parse_all(record.get("snapshots"))?,
            modifiers: string_list("modifiers", record.get("modifiers"))?,
        })
    }

    /// The normalized driver type string.
    pub fn driver_type(&self) -> &'static str {
        self.driver.as_str()
    }

    /// The credential drivers authenticate with.
    pub fn primary_credential(&self) -> Option<&Credential> {
        self.credentials.first()
    }

    /// Look up a driver-specific blob.
    pub fn blob(&self, key: &str) -> Option<&Value> {
        self.blobs.get(key)
    }
}

/// Render a scalar as text; structured values yield `None`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_list(field: &str, value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                scalar_text(item).ok_or_else(|| {
                    VmError::Config(format!("{field} entries must be scalars"))
                })
            })
            .collect(),
        Some(other) => Err(VmError::Config(format!(
            "{field} must be a sequence, got {}",
            value_kind(other)
        ))),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
