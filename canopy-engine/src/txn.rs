//! The in-flight transaction record.

use canopy_core::NodeId;
use canopy_plugin::TxnView;
use canopy_tree::{ConfigTree, Diff};

/// Transaction states.
///
/// The happy path walks left to right; any error before `Committed`
/// routes through `Aborting` back to `Idle`. A failure after
/// `Committed` is surfaced but not unwound (see the engine's error
/// policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Created, plugins not yet involved.
    Idle,
    /// All plugins returned from `begin`.
    Open,
    /// Generic and plugin validation passed.
    Validated,
    /// `complete` passed; ready to commit.
    Ready,
    /// All plugins committed.
    Committed,
    /// The target is installed as running.
    Installed,
    /// Running plugin aborts after a failure.
    Aborting,
}

/// One validate/commit pipeline in flight.
///
/// Source and target stay immutable from the plugins' point of view
/// (plugins receive the target mutably only to annotate it); the
/// vectors index into the respective trees.
pub struct Transaction {
    /// The configuration being replaced.
    pub source: ConfigTree,
    /// The configuration being installed.
    pub target: ConfigTree,
    /// Nodes present only in the source.
    pub deleted: Vec<NodeId>,
    /// Nodes present only in the target.
    pub added: Vec<NodeId>,
    /// Changed nodes, source side.
    pub src_changed: Vec<NodeId>,
    /// Changed nodes, target side (parallel to `src_changed`).
    pub tgt_changed: Vec<NodeId>,
    state: TxState,
    /// Number of plugins whose `begin` returned successfully.
    begun: usize,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// An empty transaction awaiting its trees.
    pub fn new() -> Self {
        Self {
            source: ConfigTree::new(),
            target: ConfigTree::new(),
            deleted: Vec::new(),
            added: Vec::new(),
            src_changed: Vec::new(),
            tgt_changed: Vec::new(),
            state: TxState::Idle,
            begun: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TxState) {
        self.state = state;
    }

    /// Plugins that completed `begin` (abort runs over exactly these).
    pub fn begun(&self) -> usize {
        self.begun
    }

    pub(crate) fn set_begun(&mut self, begun: usize) {
        self.begun = begun;
    }

    /// Adopt the diff vectors.
    pub(crate) fn set_diff(&mut self, diff: Diff) {
        self.deleted = diff.deleted;
        self.added = diff.added;
        self.src_changed = diff.src_changed;
        self.tgt_changed = diff.tgt_changed;
    }

    /// Drop the source-side vectors once the source tree is stale
    /// (after the target replaced running).
    pub(crate) fn clear_source_vectors(&mut self) {
        self.deleted.clear();
        self.src_changed.clear();
    }

    /// The view handed to plugin callbacks.
    pub(crate) fn view(&mut self) -> TxnView<'_> {
        TxnView {
            source: &self.source,
            target: &mut self.target,
            deleted: &self.deleted,
            added: &self.added,
            src_changed: &self.src_changed,
            tgt_changed: &self.tgt_changed,
        }
    }
}
