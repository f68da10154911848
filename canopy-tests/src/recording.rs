//! A plugin that records its lifecycle for assertions.

use std::cell::RefCell;
use std::rc::Rc;

use canopy_plugin::{Plugin, PluginFailure, PluginResult, TxnView};

/// Shared callback trace, entries like `"audit:commit"`.
pub type Trace = Rc<RefCell<Vec<String>>>;

/// Records every callback; optionally fails in one phase, optionally
/// annotates the target during `complete`.
pub struct Recording {
    name: String,
    trace: Trace,
    fail_in: Option<&'static str>,
    annotate: Option<(String, String)>,
}

impl Recording {
    /// A well-behaved recording plugin.
    pub fn new(name: &str, trace: Trace) -> Self {
        Self {
            name: name.to_string(),
            trace,
            fail_in: None,
            annotate: None,
        }
    }

    /// Fail the named phase ("begin", "validate", "complete",
    /// "commit", "commit_done", "end").
    pub fn failing(mut self, phase: &'static str) -> Self {
        self.fail_in = Some(phase);
        self
    }

    /// During `complete`, add `<leaf>value</leaf>` under the first
    /// top-level element of the target.
    pub fn annotating(mut self, leaf: &str, value: &str) -> Self {
        self.annotate = Some((leaf.to_string(), value.to_string()));
        self
    }

    fn record(&self, phase: &'static str) -> PluginResult<()> {
        self.trace
            .borrow_mut()
            .push(format!("{}:{}", self.name, phase));
        if self.fail_in == Some(phase) {
            return Err(PluginFailure::new(format!("{} refused {}", self.name, phase)));
        }
        Ok(())
    }
}

impl Plugin for Recording {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        self.record("begin")
    }

    fn validate(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        self.record("validate")
    }

    fn complete(&mut self, txn: &mut TxnView) -> PluginResult<()> {
        if let Some((leaf, value)) = &self.annotate {
            let root = txn.target.root();
            let top = txn.target.child_elements(root).next();
            if let Some(top) = top {
                txn.target
                    .add_leaf(top, leaf.clone(), None, value.clone())
                    .map_err(|e| PluginFailure::new(e.to_string()))?;
            }
        }
        self.record("complete")
    }

    fn commit(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        self.record("commit")
    }

    fn commit_done(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        self.record("commit_done")
    }

    fn end(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        self.record("end")
    }

    fn abort(&mut self, _txn: &mut TxnView) -> PluginResult<()> {
        self.record("abort")
    }

    fn reset(&mut self, db: &str) -> PluginResult<()> {
        self.trace
            .borrow_mut()
            .push(format!("{}:reset:{}", self.name, db));
        Ok(())
    }
}
