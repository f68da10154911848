//! edit-config: applying a configuration fragment to a datastore.
//!
//! The fragment is merged node by node. Each element may carry an
//! `operation` attribute overriding the RPC's default operation for
//! its subtree; matching follows the same identity rules as the diff
//! (key tuple for lists, body for leaf-lists, name otherwise).

use canopy_core::{NodeId, RpcError};
use canopy_tree::{node_identity, ConfigTree};

use crate::engine::Engine;
use crate::error::{TransactionError, TxResult};

/// NETCONF edit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// Merge content; create what is missing.
    Merge,
    /// Replace the matched subtree wholesale.
    Replace,
    /// Create; error if it already exists.
    Create,
    /// Delete; error if it does not exist.
    Delete,
    /// Delete if present, silently otherwise.
    Remove,
}

impl EditOp {
    /// Parse the attribute form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "merge" => Some(EditOp::Merge),
            "replace" => Some(EditOp::Replace),
            "create" => Some(EditOp::Create),
            "delete" => Some(EditOp::Delete),
            "remove" => Some(EditOp::Remove),
            _ => None,
        }
    }
}

impl Engine {
    /// Apply an edit fragment to a datastore and mark it dirty.
    ///
    /// The datastore is left sorted and stripped of `operation`
    /// attributes; validation happens at validate/commit time, not
    /// here.
    pub fn edit_config(
        &mut self,
        db: &str,
        default_op: EditOp,
        config: &ConfigTree,
    ) -> TxResult<()> {
        let (mut target, _) = self.store.load(db)?;
        target
            .bind(&self.spec)
            .map_err(TransactionError::Validation)?;
        let mut edit = config.clone();
        edit.bind(&self.spec)
            .map_err(TransactionError::Validation)?;

        let target_root = target.root();
        let edit_root = edit.root();
        self.merge_children(&mut target, target_root, &edit, edit_root, default_op)?;

        for node in target.descendants(target.root()) {
            target.remove_attribute(node, "operation")?;
        }
        target.sort_recurse(&self.spec)?;

        let modstate = if self.options.modstate {
            Some(self.spec.modstate())
        } else {
            None
        };
        self.store.save(db, &target, modstate.as_ref())?;
        self.store.set_modified(db, true);
        Ok(())
    }

    fn merge_children(
        &self,
        target: &mut ConfigTree,
        target_parent: NodeId,
        edit: &ConfigTree,
        edit_parent: NodeId,
        default_op: EditOp,
    ) -> TxResult<()> {
        for edit_child in edit.child_elements(edit_parent).collect::<Vec<_>>() {
            let op = match edit.attribute(edit_child, "operation") {
                Some(raw) => EditOp::parse(&raw).ok_or_else(|| {
                    TransactionError::Validation(
                        RpcError::bad_attribute(
                            edit.path_of(edit_child),
                            format!("unknown operation {:?}", raw),
                        )
                        .into(),
                    )
                })?,
                None => default_op,
            };

            let ident = node_identity(edit, edit_child, &self.spec);
            let matched = target
                .child_elements(target_parent)
                .find(|t| node_identity(target, *t, &self.spec) == ident);

            match (op, matched) {
                (EditOp::Merge, Some(existing)) => {
                    // Merge body, then recurse into children.
                    if let Some(body) = edit.body(edit_child)? {
                        target.set_body(existing, body)?;
                    }
                    self.merge_children(target, existing, edit, edit_child, op)?;
                }
                (EditOp::Merge, None) | (EditOp::Create, None) => {
                    target.copy_from(target_parent, edit, edit_child)?;
                }
                (EditOp::Replace, existing) => {
                    if let Some(node) = existing {
                        target.remove(node)?;
                    }
                    target.copy_from(target_parent, edit, edit_child)?;
                }
                (EditOp::Create, Some(existing)) => {
                    return Err(TransactionError::Validation(
                        RpcError::data_exists(
                            target.path_of(existing),
                            "element already exists",
                        )
                        .into(),
                    ));
                }
                (EditOp::Delete, None) => {
                    return Err(TransactionError::Validation(
                        RpcError::data_missing(
                            edit.path_of(edit_child),
                            "element to delete does not exist",
                        )
                        .into(),
                    ));
                }
                (EditOp::Delete, Some(existing)) | (EditOp::Remove, Some(existing)) => {
                    target.remove(existing)?;
                }
                (EditOp::Remove, None) => {}
            }
        }
        Ok(())
    }
}
