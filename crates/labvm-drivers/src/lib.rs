//! # labvm-drivers
//!
//! Hypervisor drivers for `labvm-core` that shell out to the vendor's
//! command-line tools.
//!
//! ```text
//! workstation          vmrun -T ws ...                (this host)
//! remote_workstation   ssh host 'vmrun' '-T' 'ws' ... (scp for file transfer)
//! virtualbox           VBoxManage ...                 (this host)
//! remote_esxi          ssh host 'vim-cmd' 'vmsvc/...'
//! ```
//!
//! `fog`, `dynagen`, `vsphere` and `xenapi` have no built-in driver; register
//! a constructor for them on the [`DriverRegistry`] to use them.
//!
//! ## Quick Start
//!
//! ```ignore
//! use labvm_core::{ConfigRecord, Vm};
//!
//! # async fn example() -> labvm_core::Result<()> {
//! let drivers = labvm_drivers::default_registry();
//! for record in ConfigRecord::parse_many(&std::fs::read_to_string("lab.yml")?)? {
//!     let vm = Vm::new(&record, &drivers)?;
//!     println!("{vm}: running={}", vm.is_running().await?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Tool paths come from [`DriverSettings::from_env`]. No tool is spawned
//! until an operation is called.

pub mod command;
mod esxi;
mod settings;
mod virtualbox;
mod workstation;

pub use esxi::{parse_snapshots as parse_esxi_snapshots, EsxiSnapshot, RemoteEsxiDriver};
pub use settings::DriverSettings;
pub use virtualbox::VirtualBoxDriver;
pub use workstation::WorkstationDriver;

use labvm_core::{Driver, DriverKind, DriverRegistry};
use std::sync::Arc;

/// Register the built-in drivers on an existing registry.
pub fn register_defaults(registry: &mut DriverRegistry, settings: DriverSettings) -> &mut DriverRegistry {
    let settings = Arc::new(settings);

    let s = Arc::clone(&settings);
    registry.register(DriverKind::Workstation, move |ctx| {
        Ok(Box::new(WorkstationDriver::local(ctx, Arc::clone(&s))?) as Box<dyn Driver>)
    });

    let s = Arc::clone(&settings);
    registry.register(DriverKind::RemoteWorkstation, move |ctx| {
        Ok(Box::new(WorkstationDriver::remote(ctx, Arc::clone(&s))?) as Box<dyn Driver>)
    });

    let s = Arc::clone(&settings);
    registry.register(DriverKind::VirtualBox, move |ctx| {
        Ok(Box::new(VirtualBoxDriver::new(ctx, Arc::clone(&s))?) as Box<dyn Driver>)
    });

    registry.register(DriverKind::RemoteEsxi, move |ctx| {
        Ok(Box::new(RemoteEsxiDriver::new(ctx, Arc::clone(&settings))?) as Box<dyn Driver>)
    });

    tracing::debug!(kinds = ?registry.kinds(), "Registered built-in drivers");
    registry
}

/// A registry holding the built-in drivers, configured from the environment.
pub fn default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    register_defaults(&mut registry, DriverSettings::from_env());
    registry
}
