//! Error types for labvm-core.

use crate::driver::DriverKind;
use thiserror::Error;

/// Result type alias for labvm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that can occur while building or driving a lab VM.
#[derive(Debug, Error)]
pub enum VmError {
    /// The configuration has no usable identifier
    #[error("invalid VM id: an id (or vmid) must be a non-empty string")]
    InvalidId,

    /// The configuration names no driver
    #[error("driver type is required")]
    MissingDriver,

    /// The driver type matches none of the known families
    #[error("unknown driver type: {0}")]
    UnknownDriver(String),

    /// A sanitized field contains a character outside the allow-list
    #[error("invalid character in {field}: {value:?}")]
    InvalidCharacter { field: String, value: String },

    /// The driver family is known but nothing is registered to build it
    #[error("no driver registered for {0}")]
    DriverUnavailable(DriverKind),

    /// The configuration asks for an extension nobody registered
    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    /// An extension constructor failed
    #[error("failed to attach extension {name}: {reason}")]
    Extension { name: String, reason: String },

    /// Two configured snapshots share a name
    #[error("duplicate snapshot name: {0}")]
    DuplicateSnapshot(String),

    /// Any other malformed configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend reported a failure
    #[error("{driver} backend error: {message}")]
    Backend { driver: DriverKind, message: String },

    /// The backend cannot perform this operation
    #[error("{driver} does not support {operation}")]
    Unsupported {
        driver: DriverKind,
        operation: &'static str,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl VmError {
    /// Check if this error was raised while validating configuration.
    ///
    /// Validation errors are fatal to construction; no entity is produced.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            VmError::InvalidId
                | VmError::MissingDriver
                | VmError::UnknownDriver(_)
                | VmError::InvalidCharacter { .. }
                | VmError::DriverUnavailable(_)
                | VmError::UnknownExtension(_)
                | VmError::Extension { .. }
                | VmError::DuplicateSnapshot(_)
                | VmError::Config(_)
        )
    }

    /// Check if this error means the backend lacks the operation.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, VmError::Unsupported { .. })
    }
}
