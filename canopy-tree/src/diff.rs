//! Transaction diff between two configuration trees.
//!
//! Matching identity: list entries match by their YANG key tuple,
//! leaf-list entries by body, everything else by (namespace, name).
//! A subtree present on only one side contributes a single vector
//! entry (its topmost node); the walk does not descend into it.

use std::collections::HashMap;

use canopy_core::{Flags, NodeId};

use crate::schema::Schema;
use crate::tree::ConfigTree;

/// The four disjoint outcome vectors of a diff.
///
/// `src_changed` and `tgt_changed` are parallel: entry `i` of each is
/// the same logical node in the source and target tree respectively.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    /// Present in the source only.
    pub deleted: Vec<NodeId>,
    /// Present in the target only.
    pub added: Vec<NodeId>,
    /// Matched nodes whose body differs, source side.
    pub src_changed: Vec<NodeId>,
    /// Matched nodes whose body differs, target side.
    pub tgt_changed: Vec<NodeId>,
}

impl Diff {
    /// True if the trees were identical.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
            && self.added.is_empty()
            && self.src_changed.is_empty()
            && self.tgt_changed.is_empty()
    }
}

/// Compute the diff between two sorted, spec-bound trees.
pub fn diff(src: &ConfigTree, tgt: &ConfigTree, schema: &dyn Schema) -> Diff {
    let mut out = Diff::default();
    diff_children(src, src.root(), tgt, tgt.root(), schema, &mut out);
    out
}

/// The matching identity of a node: (namespace, name), extended with
/// the key tuple for list entries and the body for leaf-list entries.
pub fn node_identity(tree: &ConfigTree, node: NodeId, schema: &dyn Schema) -> String {
    let ns = tree.namespace_of(node).ok().flatten().unwrap_or("");
    let name = tree.name(node).unwrap_or("");
    let mut key = format!("{}\u{1}{}", ns, name);
    if let Some(spec) = tree.spec(node) {
        let list_keys = schema.list_keys(spec);
        if !list_keys.is_empty() {
            for k in list_keys {
                key.push('\u{1}');
                if let Ok(Some(v)) = tree.child_body(node, k) {
                    key.push_str(&v);
                }
            }
            return key;
        }
        if schema.is_leaf_list(spec) {
            key.push('\u{1}');
            if let Ok(Some(body)) = tree.body(node) {
                key.push_str(&body);
            }
        }
    }
    key
}

fn diff_children(
    src: &ConfigTree,
    src_parent: NodeId,
    tgt: &ConfigTree,
    tgt_parent: NodeId,
    schema: &dyn Schema,
    out: &mut Diff,
) {
    // Identity -> target children with that identity, consumed as they
    // match. Duplicate identities (pre-validation trees) pair up in
    // document order.
    let mut tgt_by_ident: HashMap<String, Vec<NodeId>> = HashMap::new();
    let tgt_children: Vec<NodeId> = tgt.child_elements(tgt_parent).collect();
    for child in &tgt_children {
        tgt_by_ident
            .entry(node_identity(tgt, *child, schema))
            .or_default()
            .push(*child);
    }

    let mut matched: Vec<NodeId> = Vec::new();
    for src_child in src.child_elements(src_parent).collect::<Vec<_>>() {
        let key = node_identity(src, src_child, schema);
        let tgt_child = match tgt_by_ident.get_mut(&key) {
            Some(candidates) if !candidates.is_empty() => candidates.remove(0),
            _ => {
                out.deleted.push(src_child);
                continue;
            }
        };
        matched.push(tgt_child);

        let src_body = src.body(src_child).ok().flatten();
        let tgt_body = tgt.body(tgt_child).ok().flatten();
        if src_body != tgt_body {
            out.src_changed.push(src_child);
            out.tgt_changed.push(tgt_child);
        }
        diff_children(src, src_child, tgt, tgt_child, schema, out);
    }

    for child in tgt_children {
        if !matched.contains(&child) {
            out.added.push(child);
        }
    }
}

/// Flag both trees according to a diff, as the transaction engine and
/// plugins expect to see them:
/// - deleted subtrees get `DEL` downward, ancestors get `CHANGE`
/// - added subtrees get `ADD` downward, ancestors get `CHANGE`
/// - changed pairs get `CHANGE` on the node and its ancestors, both sides
pub fn mark_transaction_flags(src: &mut ConfigTree, tgt: &mut ConfigTree, diff: &Diff) {
    for node in &diff.deleted {
        let _ = src.set_flag_subtree(*node, Flags::DEL);
        let _ = src.set_flag_ancestors(*node, Flags::CHANGE);
    }
    for node in &diff.added {
        let _ = tgt.set_flag_subtree(*node, Flags::ADD);
        let _ = tgt.set_flag_ancestors(*node, Flags::CHANGE);
    }
    for node in &diff.src_changed {
        let _ = src.set_flag(*node, Flags::CHANGE);
        let _ = src.set_flag_ancestors(*node, Flags::CHANGE);
    }
    for node in &diff.tgt_changed {
        let _ = tgt.set_flag(*node, Flags::CHANGE);
        let _ = tgt.set_flag_ancestors(*node, Flags::CHANGE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::SpecId;

    /// A schema where every element named "entry" is a list keyed by
    /// "name", and "tag" is a leaf-list.
    struct TestSchema {
        keys: Vec<String>,
    }

    impl TestSchema {
        fn new() -> Self {
            Self {
                keys: vec!["name".to_string()],
            }
        }
    }

    impl Schema for TestSchema {
        fn root_child(&self, _ns: Option<&str>, _name: &str) -> Option<SpecId> {
            Some(SpecId::new(1))
        }
        fn child_of(&self, _parent: SpecId, _ns: Option<&str>, name: &str) -> Option<SpecId> {
            match name {
                "entry" => Some(SpecId::new(2)),
                "tag" => Some(SpecId::new(3)),
                _ => Some(SpecId::new(1)),
            }
        }
        fn list_keys(&self, spec: SpecId) -> &[String] {
            if spec == SpecId::new(2) {
                &self.keys
            } else {
                &[]
            }
        }
        fn is_leaf_list(&self, spec: SpecId) -> bool {
            spec == SpecId::new(3)
        }
        fn ordered_by_user(&self, _spec: SpecId) -> bool {
            false
        }
    }

    fn build(entries: &[(&str, &str)], tags: &[&str]) -> ConfigTree {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let top = tree.add_element(root, "top", Some("urn:example:t")).unwrap();
        for (name, value) in entries {
            let e = tree.add_element(top, "entry", None).unwrap();
            tree.add_leaf(e, "name", None, *name).unwrap();
            tree.add_leaf(e, "value", None, *value).unwrap();
        }
        for tag in tags {
            tree.add_leaf(top, "tag", None, *tag).unwrap();
        }
        let schema = TestSchema::new();
        tree.bind(&schema).unwrap();
        tree
    }

    #[test]
    fn test_diff_self_is_empty() {
        // GIVEN
        let schema = TestSchema::new();
        let tree = build(&[("a", "1"), ("b", "2")], &["x"]);

        // WHEN
        let d = diff(&tree, &tree, &schema);

        // THEN
        assert!(d.is_empty());
    }

    #[test]
    fn test_diff_added_and_deleted_lists() {
        // GIVEN
        let schema = TestSchema::new();
        let src = build(&[("a", "1")], &[]);
        let tgt = build(&[("b", "2")], &[]);

        // WHEN
        let d = diff(&src, &tgt, &schema);

        // THEN - one list entry deleted, one added, nothing changed
        assert_eq!(d.deleted.len(), 1);
        assert_eq!(d.added.len(), 1);
        assert!(d.src_changed.is_empty());
        assert_eq!(src.name(d.deleted[0]).unwrap(), "entry");
        assert_eq!(tgt.name(d.added[0]).unwrap(), "entry");
    }

    #[test]
    fn test_diff_changed_leaf() {
        // GIVEN - same entry, different value leaf
        let schema = TestSchema::new();
        let src = build(&[("a", "1")], &[]);
        let tgt = build(&[("a", "2")], &[]);

        // WHEN
        let d = diff(&src, &tgt, &schema);

        // THEN - the value leaf is a changed pair
        assert!(d.deleted.is_empty());
        assert!(d.added.is_empty());
        assert_eq!(d.src_changed.len(), 1);
        assert_eq!(d.tgt_changed.len(), 1);
        assert_eq!(src.name(d.src_changed[0]).unwrap(), "value");
        assert_eq!(tgt.body(d.tgt_changed[0]).unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_diff_leaf_list_by_body() {
        // GIVEN - leaf-lists match by body, never "change"
        let schema = TestSchema::new();
        let src = build(&[], &["x", "y"]);
        let tgt = build(&[], &["y", "z"]);

        // WHEN
        let d = diff(&src, &tgt, &schema);

        // THEN
        assert_eq!(d.deleted.len(), 1);
        assert_eq!(d.added.len(), 1);
        assert!(d.src_changed.is_empty());
        assert_eq!(src.body(d.deleted[0]).unwrap(), Some("x".to_string()));
        assert_eq!(tgt.body(d.added[0]).unwrap(), Some("z".to_string()));
    }

    #[test]
    fn test_mark_flags() {
        // GIVEN
        let schema = TestSchema::new();
        let mut src = build(&[("a", "1"), ("b", "2")], &[]);
        let mut tgt = build(&[("a", "9"), ("c", "3")], &[]);
        let d = diff(&src, &tgt, &schema);

        // WHEN
        mark_transaction_flags(&mut src, &mut tgt, &d);

        // THEN - deleted subtree marked DEL downward
        let deleted = d.deleted[0];
        assert!(src.flags(deleted).contains(Flags::DEL));
        for child in src.child_elements(deleted).collect::<Vec<_>>() {
            assert!(src.flags(child).contains(Flags::DEL));
        }
        // Ancestors of changes carry CHANGE
        let top_src = src.child_elements(src.root()).next().unwrap();
        let top_tgt = tgt.child_elements(tgt.root()).next().unwrap();
        assert!(src.flags(top_src).contains(Flags::CHANGE));
        assert!(tgt.flags(top_tgt).contains(Flags::CHANGE));
        // Added subtree marked ADD
        assert!(tgt.flags(d.added[0]).contains(Flags::ADD));
    }
}
