//! Rendering a VM's construction-time configuration back to a record.
//!
//! The output is a configuration dump, not a state snapshot: run state and
//! backend-reported snapshots are never included.

use crate::config::{ConfigRecord, VmConfig};
use crate::error::Result;
use crate::vm::Vm;
use serde_yaml::{Mapping, Value};

impl VmConfig {
    /// Build a configuration record that reconstructs an equivalent VM.
    ///
    /// # Errors
    /// Returns an error if the credential list cannot be converted to YAML.
    pub fn to_record(&self) -> Result<ConfigRecord> {
        let mut record = ConfigRecord::new()
            .set("vmid", self.id.as_str())
            .set("hostname", self.hostname.as_str())
            .set("driver", self.driver_type());

        if let Some(description) = &self.description {
            record.insert("description", description.as_str());
        }
        record.insert("location", self.location.as_str());
        record.insert("type", self.class.as_str());
        if let Some(tools) = self.tools {
            record.insert("tools", tools);
        }
        if let Some(os) = &self.os {
            record.insert("os", os.as_str());
        }
        if let Some(arch) = &self.arch {
            record.insert("arch", arch.as_str());
        }

        if let Some(remote) = &self.remote {
            let fields = [
                ("user", &remote.user),
                ("host", &remote.host),
                ("port", &remote.port),
                ("pass", &remote.pass),
            ];
            for (key, value) in fields {
                if let Some(value) = value {
                    record.insert(key, value.as_str());
                }
            }
        }

        for (key, blob) in &self.blobs {
            if let Some(key) = key.as_str() {
                record.insert(key, blob.clone());
            }
        }

        record.insert("credentials", serde_yaml::to_value(&self.credentials)?);

        if let Some(notes) = &self.notes {
            record.insert("notes", notes.as_str());
        }
        if !self.machine_tags.is_empty() {
            record.insert("machine_tags", self.machine_tags.clone());
        }
        if !self.snapshots.is_empty() {
            let mut snapshots = Mapping::new();
            for snapshot in &self.snapshots {
                let mut entry = Mapping::new();
                entry.insert("tags".into(), snapshot.tags.clone().into());
                snapshots.insert(snapshot.name.as_str().into(), Value::Mapping(entry));
            }
            record.insert("snapshots", snapshots);
        }
        if !self.modifiers.is_empty() {
            record.insert("modifiers", self.modifiers.clone());
        }

        Ok(record)
    }
}

impl Vm {
    /// Render this VM's configuration as a single-entry YAML sequence.
    ///
    /// # Errors
    /// Returns an error if YAML serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        let record = self.config().to_record()?;
        Ok(serde_yaml::to_string(&[record.as_mapping()])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{registry, CallLog};

    const FULL: &str = r#"
id: "42"
hostname: winxp-ie6
driver: Remote_Workstation
description: |
  Windows XP SP2: IE6, Flash 10 & Reader 9
location: /vmfs/volumes/lab/winxp "ie6"/winxp.vmx
class: vulnerable
tools: true
os: windows
arch: 32
notes: "legacy; do not patch"
user: labadmin
host: 10.0.0.5
port: 2222
credentials:
  - user: Administrator
    pass: "P4ss!"
    admin: true
  - user: guest
    pass: guest
    keyfile: /keys/guest.pem
platform: c7200
machine_tags: [ie6, flash_10]
snapshots:
  clean: {tags: []}
  bap: {tags: [reader_9.3.3]}
"#;

    #[test]
    fn test_round_trip() {
        let log = CallLog::default();
        let drivers = registry(&log);
        let original = Vm::new(&ConfigRecord::from_yaml(FULL).unwrap(), &drivers).unwrap();

        let yaml = original.to_yaml().unwrap();
        let records = ConfigRecord::parse_many(&yaml).unwrap();
        assert_eq!(records.len(), 1);
        let rebuilt = Vm::new(&records[0], &drivers).unwrap();

        assert_eq!(rebuilt.config(), original.config());
        assert_eq!(rebuilt.id(), "42");
        assert_eq!(rebuilt.driver_type(), "remote_workstation");
        assert_eq!(rebuilt.arch(), Some("32"));
        assert_eq!(rebuilt.tools(), Some(true));
        assert_eq!(rebuilt.credentials().len(), 2);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_key_order_and_omissions() {
        let record = ConfigRecord::new().set("id", "vm-1").set("driver", "virtualbox");
        let vm = Vm::new(&record, &registry(&CallLog::default())).unwrap();
        let yaml = vm.to_yaml().unwrap();
        assert_eq!(
            yaml,
            "- vmid: vm-1\n  hostname: vm-1\n  driver: virtualbox\n  location: ''\n  type: unspecified\n  credentials: []\n"
        );
    }

    #[test]
    fn test_remote_fields_only_when_set() {
        let record = ConfigRecord::new()
            .set("id", "vm-1")
            .set("driver", "remote_esxi")
            .set("host", "esx01");
        let vm = Vm::new(&record, &registry(&CallLog::default())).unwrap();
        let out = vm.config().to_record().unwrap();
        assert_eq!(out.text(&["host"]).as_deref(), Some("esx01"));
        assert!(out.get("user").is_none());
        assert!(out.get("port").is_none());
    }
}
