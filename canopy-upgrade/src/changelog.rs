//! The declarative changelog.
//!
//! A changelog is an ordered list of entries, each naming a namespace
//! and a revision interval, each carrying an ordered list of steps.
//! An entry applies when its interval lies inside the upgrade interval
//! of the datastore being replayed; its steps then run in document
//! order. Any failing operation aborts the upgrade.

use std::fs;
use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};
use tracing::debug;

use canopy_core::Revision;
use canopy_tree::{ConfigTree, NodeRepr};

use crate::error::UpgradeResult;
use crate::ops;

/// A step operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOp {
    Rename,
    Replace,
    Insert,
    Delete,
    Move,
}

impl StepOp {
    /// Name for logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOp::Rename => "rename",
            StepOp::Replace => "replace",
            StepOp::Insert => "insert",
            StepOp::Delete => "delete",
            StepOp::Move => "move",
        }
    }
}

/// One changelog step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// The operation.
    pub op: StepOp,
    /// Path selecting the target nodes.
    #[serde(rename = "where")]
    pub where_: String,
    /// Boolean guard evaluated per target; false skips the target.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub when: Option<String>,
    /// For `rename`: expression yielding the new name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tag: Option<String>,
    /// For `move`: path selecting the destination parent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dst: Option<String>,
    /// For `replace`/`insert`: the embedded subtree.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new: Option<NodeRepr>,
}

/// One changelog entry: a revision interval and its steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Module namespace the entry upgrades.
    pub namespace: String,
    /// First revision the steps apply from.
    pub revfrom: Revision,
    /// Revision the steps upgrade to.
    pub revision: Revision,
    /// Steps, applied in order.
    pub steps: Vec<Step>,
}

/// A loaded changelog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Changelog {
    /// Entries in document order.
    pub entries: Vec<ChangelogEntry>,
}

impl Changelog {
    /// Load a changelog from a file.
    pub fn load(path: impl AsRef<FsPath>) -> UpgradeResult<Self> {
        let bytes = fs::read_to_string(path)?;
        Self::parse(&bytes)
    }

    /// Parse a changelog document.
    pub fn parse(input: &str) -> UpgradeResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Apply the entries relevant to upgrading `namespace` from
    /// revision `from` to revision `to`, in document order.
    ///
    /// An entry is relevant when its `[revfrom, revision]` interval
    /// lies within `[from, to]`: the entry must start at or after the
    /// revision the content was authored against (`from <= revfrom`,
    /// with an absent `revfrom` always passing) and must not upgrade
    /// past the running schema (`revision <= to`). An entry predating
    /// the authored revision describes a transformation the content
    /// already incorporates and must not run again.
    pub fn upgrade(
        &self,
        tree: &mut ConfigTree,
        namespace: &str,
        from: Revision,
        to: Revision,
    ) -> UpgradeResult<()> {
        for entry in &self.entries {
            if entry.namespace != namespace {
                continue;
            }
            let low_ok = entry.revfrom.is_none() || from <= entry.revfrom;
            let high_ok = to >= entry.revision;
            if !(low_ok && high_ok) {
                continue;
            }
            debug!(
                namespace,
                revfrom = %entry.revfrom,
                revision = %entry.revision,
                steps = entry.steps.len(),
                "applying changelog entry"
            );
            for step in &entry.steps {
                ops::apply_step(tree, step)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changelog(revfrom: &str, revision: &str) -> Changelog {
        Changelog {
            entries: vec![ChangelogEntry {
                namespace: "urn:example:sys".to_string(),
                revfrom: Revision::parse(revfrom).unwrap(),
                revision: Revision::parse(revision).unwrap(),
                steps: vec![Step {
                    op: StepOp::Delete,
                    where_: "/system/legacy".to_string(),
                    when: None,
                    tag: None,
                    dst: None,
                    new: None,
                }],
            }],
        }
    }

    fn tree_with_legacy() -> ConfigTree {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let system = tree.add_element(root, "system", Some("urn:example:sys")).unwrap();
        tree.add_leaf(system, "legacy", None, "x").unwrap();
        tree
    }

    #[test]
    fn test_entry_in_interval_applies() {
        // GIVEN
        let log = changelog("2023-01-01", "2023-06-01");
        let mut tree = tree_with_legacy();

        // WHEN - upgrading across the entry's interval
        log.upgrade(
            &mut tree,
            "urn:example:sys",
            Revision(20230101),
            Revision(20240101),
        )
        .unwrap();

        // THEN - the step ran
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert_eq!(tree.find_child(system, "legacy").unwrap(), None);
    }

    #[test]
    fn test_entry_outside_interval_skipped() {
        // GIVEN - entry older than the stored revision
        let log = changelog("2020-01-01", "2021-01-01");
        let mut tree = tree_with_legacy();

        // WHEN
        log.upgrade(
            &mut tree,
            "urn:example:sys",
            Revision(20230101),
            Revision(20240101),
        )
        .unwrap();

        // THEN - untouched
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert!(tree.find_child(system, "legacy").unwrap().is_some());
    }

    #[test]
    fn test_entry_predating_authored_revision_skipped() {
        // GIVEN - an entry whose interval merely overlaps the upgrade
        // interval but starts before the authored revision: the stored
        // content was written at 2023-01-15, so a 2023-01-10 ->
        // 2024-01-20 entry is already incorporated
        let log = changelog("2023-01-10", "2024-01-20");
        let mut tree = tree_with_legacy();

        // WHEN - upgrading 2023-01-15 -> 2026-01-25
        log.upgrade(
            &mut tree,
            "urn:example:sys",
            Revision(20230115),
            Revision(20260125),
        )
        .unwrap();

        // THEN - the step must not run a second time
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert!(tree.find_child(system, "legacy").unwrap().is_some());
    }

    #[test]
    fn test_entry_past_target_revision_skipped() {
        // GIVEN - an entry upgrading beyond the running schema
        let log = changelog("2023-06-01", "2025-01-01");
        let mut tree = tree_with_legacy();

        // WHEN - the schema only reaches 2024-01-01
        log.upgrade(
            &mut tree,
            "urn:example:sys",
            Revision(20230101),
            Revision(20240101),
        )
        .unwrap();

        // THEN
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert!(tree.find_child(system, "legacy").unwrap().is_some());
    }

    #[test]
    fn test_other_namespace_skipped() {
        let log = changelog("2023-01-01", "2023-06-01");
        let mut tree = tree_with_legacy();
        log.upgrade(&mut tree, "urn:other", Revision(20230101), Revision(20240101))
            .unwrap();
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert!(tree.find_child(system, "legacy").unwrap().is_some());
    }

    #[test]
    fn test_document_round_trip() {
        // GIVEN
        let log = changelog("2023-01-01", "2023-06-01");

        // WHEN
        let json = serde_json::to_string_pretty(&log).unwrap();
        let parsed = Changelog::parse(&json).unwrap();

        // THEN
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].steps[0].op, StepOp::Delete);
        assert_eq!(parsed.entries[0].steps[0].where_, "/system/legacy");
    }
}
