//! # labvm-core
//!
//! A uniform handle for lab VMs backed by interchangeable hypervisor and
//! cloud drivers.
//!
//! A [`Vm`] is built once from a [`ConfigRecord`]. Construction validates
//! and sanitizes the record, then a [`DriverRegistry`] resolves exactly one
//! [`Driver`] for it. Every lifecycle, snapshot, file and command operation
//! is forwarded to that driver.
//!
//! ## Quick Start
//!
//! ```ignore
//! use labvm_core::{ConfigRecord, Vm};
//!
//! # async fn example(drivers: labvm_core::DriverRegistry) -> labvm_core::Result<()> {
//! let record = ConfigRecord::from_yaml(
//!     "id: winxp\ndriver: workstation\nlocation: /vms/winxp/winxp.vmx\n",
//! )?;
//! let vm = Vm::new(&record, &drivers)?;
//!
//! vm.revert_and_start("clean").await?;
//! vm.open_uri("http://10.0.0.1/exploit").await?;
//!
//! // Persist the configuration, not the live state
//! println!("{}", vm.to_yaml()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Sanitized configuration**: command-bound fields pass an allow-list
//! - **Driver registry**: closed set of families, explicit constructors
//! - **Snapshot/tag model**: machine tags and per-snapshot tags
//! - **Extensions**: optional capability modules, attached at construction
//! - **Serializer**: YAML configuration dump that round-trips

mod config;
mod driver;
mod error;
mod extension;
mod registry;
pub mod sanitize;
mod serialize;
mod snapshot;
mod vm;

#[cfg(test)]
mod mock;

pub use config::{ConfigRecord, Credential, RemoteConnection, VmConfig, BLOB_KEYS, DEFAULT_CLASS};
pub use driver::{Driver, DriverKind, ExecResult};
pub use error::{Result, VmError};
pub use extension::{Extension, ExtensionConstructor, ExtensionRegistry};
pub use registry::{DriverConstructor, DriverContext, DriverRegistry};
pub use snapshot::{union_tags, Snapshot, SnapshotReport};
pub use vm::{Vm, GENERIC_BROWSER, WINDOWS_BROWSER};
