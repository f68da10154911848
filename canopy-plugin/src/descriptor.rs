//! The plugin capability surface.

use canopy_core::{ModstateDiff, NodeId, Revision};
use canopy_tree::ConfigTree;

use crate::error::PluginFailure;

/// Result type for plugin callbacks.
pub type PluginResult<T> = Result<T, PluginFailure>;

/// The transaction as a plugin sees it.
///
/// The source tree is immutable; plugins may annotate the target with
/// derived or default data during `begin`/`complete`, and those
/// annotations become part of what is written to running. The vectors
/// index into the respective trees.
pub struct TxnView<'a> {
    /// The configuration being replaced.
    pub source: &'a ConfigTree,
    /// The configuration being installed.
    pub target: &'a mut ConfigTree,
    /// Nodes present only in the source.
    pub deleted: &'a [NodeId],
    /// Nodes present only in the target.
    pub added: &'a [NodeId],
    /// Changed nodes, source side.
    pub src_changed: &'a [NodeId],
    /// Changed nodes, target side (parallel to `src_changed`).
    pub tgt_changed: &'a [NodeId],
}

/// A registered extension.
///
/// Every callback is optional; the defaults are no-ops, so a plugin
/// implements exactly the phases it cares about. Callbacks that fail
/// abort the transaction (except `abort` itself, which is best-effort).
pub trait Plugin {
    /// Stable name, used in ordering, logs and error attribution.
    fn name(&self) -> &str;

    /// Transaction started; the diff is available.
    fn begin(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        Ok(())
    }

    /// Application-level validation of the target.
    fn validate(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        Ok(())
    }

    /// Last chance to annotate the target before commit.
    fn complete(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        Ok(())
    }

    /// Apply the change to the system.
    fn commit(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        Ok(())
    }

    /// All plugins committed successfully.
    fn commit_done(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        Ok(())
    }

    /// Transaction finished; release per-transaction state.
    fn end(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        Ok(())
    }

    /// Transaction failed after this plugin's `begin` returned; undo.
    fn abort(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        Ok(())
    }

    /// Seed a freshly reset datastore (used by per-plugin restart).
    fn reset(&mut self, _db: &str) -> PluginResult<()> {
        Ok(())
    }

    /// General-purpose datastore upgrade, before module upgrades.
    fn datastore_upgrade(
        &mut self,
        _tree: &mut ConfigTree,
        _msdiff: Option<&ModstateDiff>,
    ) -> PluginResult<()> {
        Ok(())
    }

    /// Module-specific upgrade for one namespace.
    fn module_upgrade(
        &mut self,
        _tree: &mut ConfigTree,
        _namespace: &str,
        _from: Revision,
        _to: Revision,
    ) -> PluginResult<()> {
        Ok(())
    }

    /// Context fence sampled before and after every callback. A plugin
    /// whose fence value changes across a callback has corrupted its
    /// own state and fails the transaction.
    fn fence(&self) -> u64 {
        0
    }
}
