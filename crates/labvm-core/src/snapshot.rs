//! Snapshot and tag model.
//!
//! Machine tags describe the base image. Each configured snapshot carries
//! its own tags. The two are never merged implicitly; see
//! [`Vm::tags_at`](crate::Vm::tags_at).

use crate::config::{scalar_text, value_kind};
use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeSet, HashSet};

/// A configured snapshot and the tags describing its state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot name, unique per VM
    pub name: String,
    /// Tags describing what the snapshot captures
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Snapshot {
    /// Create a snapshot entry.
    pub fn new(name: impl Into<String>, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse the `snapshots` configuration value.
    ///
    /// Accepts a mapping of name to tags, or a sequence whose entries are
    /// either bare names or single-key mappings of name to tags. Tags may be
    /// given directly as a list or under a `tags` / `snapshot_tags` key.
    ///
    /// # Errors
    /// Returns [`VmError::DuplicateSnapshot`] if a name appears twice and
    /// [`VmError::Config`] for any other shape.
    pub fn parse_all(value: Option<&Value>) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        match value {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(map)) => collect_mapping(map, &mut snapshots)?,
            Some(Value::Sequence(items)) => {
                for item in items {
                    match item {
                        Value::Mapping(map) => collect_mapping(map, &mut snapshots)?,
                        other => {
                            let name = scalar_text(other).ok_or_else(|| {
                                VmError::Config(format!(
                                    "snapshot entry must be a name or mapping, got {}",
                                    value_kind(other)
                                ))
                            })?;
                            snapshots.push(Snapshot::new(name, Vec::<String>::new()));
                        }
                    }
                }
            }
            Some(other) => {
                return Err(VmError::Config(format!(
                    "snapshots must be a mapping or sequence, got {}",
                    value_kind(other)
                )))
            }
        }

        let mut seen = HashSet::new();
        for snapshot in &snapshots {
            if !seen.insert(snapshot.name.as_str()) {
                return Err(VmError::DuplicateSnapshot(snapshot.name.clone()));
            }
        }
        Ok(snapshots)
    }
}

fn collect_mapping(map: &Mapping, out: &mut Vec<Snapshot>) -> Result<()> {
    for (key, value) in map {
        let name = scalar_text(key)
            .ok_or_else(|| VmError::Config("snapshot names must be scalars".into()))?;
        let mut tags = Vec::new();
        collect_tags(value, &mut tags)?;
        out.push(Snapshot { name, tags });
    }
    Ok(())
}

fn collect_tags(value: &Value, out: &mut Vec<String>) -> Result<()> {
    match value {
        Value::Null => {}
        Value::Sequence(items) => {
            for item in items {
                collect_tags(item, out)?;
            }
        }
        Value::Mapping(map) => {
            if let Some(tags) = map.get("tags").or_else(|| map.get("snapshot_tags")) {
                collect_tags(tags, out)?;
            }
        }
        Value::Tagged(_) => {
            return Err(VmError::Config("snapshot tags must be plain values".into()))
        }
        scalar => out.extend(scalar_text(scalar)),
    }
    Ok(())
}

/// Explicit union of machine tags and one snapshot's tags.
pub fn union_tags(machine_tags: &[String], snapshot: &Snapshot) -> BTreeSet<String> {
    machine_tags
        .iter()
        .chain(snapshot.tags.iter())
        .cloned()
        .collect()
}

/// Result of matching backend-reported snapshots against configured ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReport {
    /// Present in both the backend and the configuration
    pub matched: Vec<String>,
    /// Reported by the backend but absent from the configuration
    pub unconfigured: Vec<String>,
    /// Configured but not reported by the backend
    pub missing: Vec<String>,
}

impl SnapshotReport {
    /// Match snapshots by name.
    pub fn reconcile(configured: &[Snapshot], reported: &[String]) -> Self {
        let configured_names: HashSet<&str> =
            configured.iter().map(|s| s.name.as_str()).collect();
        let reported_names: HashSet<&str> = reported.iter().map(String::as_str).collect();

        let (matched, unconfigured) = reported
            .iter()
            .cloned()
            .partition(|name| configured_names.contains(name.as_str()));

        let missing = configured
            .iter()
            .filter(|s| !reported_names.contains(s.name.as_str()))
            .map(|s| s.name.clone())
            .collect();

        Self {
            matched,
            unconfigured,
            missing,
        }
    }

    /// Whether backend and configuration agree.
    pub fn is_consistent(&self) -> bool {
        self.unconfigured.is_empty() && self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Vec<Snapshot>> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        Snapshot::parse_all(Some(&value))
    }

    #[test]
    fn test_mapping_form() {
        let snapshots = parse(
            r#"
clean:
  tags: []
bap:
  tags: [flash_10.2.153.1, reader_9.3.3]
"#,
        )
        .unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0], Snapshot::new("clean", Vec::<String>::new()));
        assert_eq!(snapshots[1].tags, vec!["flash_10.2.153.1", "reader_9.3.3"]);
    }

    #[test]
    fn test_nested_sequence_form() {
        let snapshots = parse(
            r#"
- ie6:
  - snapshot_tags:
    - ie6
- ie7:
  - snapshot_tags:
    - ie7
    - ie8
- base
"#,
        )
        .unwrap();
        let names: Vec<_> = snapshots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["ie6", "ie7", "base"]);
        assert_eq!(snapshots[1].tags, vec!["ie7", "ie8"]);
        assert!(snapshots[2].tags.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = parse("- a\n- b\n- a\n").unwrap_err();
        assert!(matches!(err, VmError::DuplicateSnapshot(name) if name == "a"));
    }

    #[test]
    fn test_bad_shape_rejected() {
        assert!(parse("just-a-string").is_err());
    }

    #[test]
    fn test_union_tags() {
        let machine = vec!["ie6".to_string(), "firefox".to_string()];
        let snapshot = Snapshot::new("bap", ["java_6u23", "firefox"]);
        let all = union_tags(&machine, &snapshot);
        assert_eq!(all.len(), 3);
        assert!(all.contains("java_6u23"));
        assert!(all.contains("ie6"));
    }

    #[test]
    fn test_reconcile() {
        let configured = vec![
            Snapshot::new("clean", Vec::<String>::new()),
            Snapshot::new("bap", ["flash"]),
        ];
        let reported = vec!["clean".to_string(), "scratch".to_string()];
        let report = SnapshotReport::reconcile(&configured, &reported);
        assert_eq!(report.matched, vec!["clean"]);
        assert_eq!(report.unconfigured, vec!["scratch"]);
        assert_eq!(report.missing, vec!["bap"]);
        assert!(!report.is_consistent());

        let report = SnapshotReport::reconcile(&configured[..1], &reported[..1]);
        assert!(report.is_consistent());
    }
}
