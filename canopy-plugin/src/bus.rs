//! The ordered plugin bus.

use tracing::{debug, warn};

use crate::descriptor::{Plugin, TxnView};
use crate::error::PluginError;
use crate::Phase;

/// Registered plugins in their total order.
#[derive(Default)]
pub struct PluginBus {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin; registration order is invocation order.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// True if no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Find a plugin index by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.name() == name)
    }

    /// Mutable access to one plugin (per-plugin restart).
    pub fn plugin_mut(&mut self, index: usize) -> Option<&mut Box<dyn Plugin>> {
        self.plugins.get_mut(index)
    }

    fn dispatch(
        plugin: &mut Box<dyn Plugin>,
        phase: Phase,
        txn: &mut TxnView,
    ) -> Result<(), PluginError> {
        let fence = plugin.fence();
        let name = plugin.name().to_string();
        debug!(plugin = %name, phase = %phase, "plugin callback");
        let result = match phase {
            Phase::Begin => plugin.begin(txn),
            Phase::Validate => plugin.validate(txn),
            Phase::Complete => plugin.complete(txn),
            Phase::Commit => plugin.commit(txn),
            Phase::CommitDone => plugin.commit_done(txn),
            Phase::End => plugin.end(txn),
            Phase::Abort => plugin.abort(txn),
        };
        result.map_err(|source| PluginError::Callback {
            plugin: name.clone(),
            context: phase.as_str().to_string(),
            source,
        })?;
        if plugin.fence() != fence {
            return Err(PluginError::FenceTripped {
                plugin: name,
                context: phase.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Run `begin` across all plugins in order.
    ///
    /// On failure returns the number of plugins that completed `begin`
    /// (the failing one is not counted) so the caller can abort exactly
    /// those.
    pub fn begin(&mut self, txn: &mut TxnView) -> Result<usize, (usize, PluginError)> {
        for (i, plugin) in self.plugins.iter_mut().enumerate() {
            if let Err(e) = Self::dispatch(plugin, Phase::Begin, txn) {
                return Err((i, e));
            }
        }
        Ok(self.plugins.len())
    }

    /// Run one of the ordered phases across all plugins, stopping at
    /// the first failure.
    pub fn run(&mut self, phase: Phase, txn: &mut TxnView) -> Result<(), PluginError> {
        for plugin in self.plugins.iter_mut() {
            Self::dispatch(plugin, phase, txn)?;
        }
        Ok(())
    }

    /// Run `end` across all plugins.
    ///
    /// Best-effort like `abort`: every plugin gets its `end` exactly
    /// once even if an earlier one fails; the first failure is
    /// reported after the sweep.
    pub fn end(&mut self, txn: &mut TxnView) -> Result<(), PluginError> {
        let mut first: Option<PluginError> = None;
        for plugin in self.plugins.iter_mut() {
            if let Err(e) = Self::dispatch(plugin, Phase::End, txn) {
                warn!(error = %e, "plugin end failed, continuing");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run one phase on a single plugin (per-plugin restart).
    pub fn run_one(
        &mut self,
        index: usize,
        phase: Phase,
        txn: &mut TxnView,
    ) -> Result<(), PluginError> {
        if let Some(plugin) = self.plugins.get_mut(index) {
            Self::dispatch(plugin, phase, txn)?;
        }
        Ok(())
    }

    /// Run `reset` on a single plugin, fenced.
    pub fn reset_one(&mut self, index: usize, db: &str) -> Result<(), PluginError> {
        if let Some(plugin) = self.plugins.get_mut(index) {
            let fence = plugin.fence();
            let name = plugin.name().to_string();
            plugin.reset(db).map_err(|source| PluginError::Callback {
                plugin: name.clone(),
                context: "reset".to_string(),
                source,
            })?;
            if plugin.fence() != fence {
                return Err(PluginError::FenceTripped {
                    plugin: name,
                    context: "reset".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run every plugin's general datastore upgrade over a loaded tree.
    pub fn datastore_upgrade(
        &mut self,
        tree: &mut canopy_tree::ConfigTree,
        msdiff: Option<&canopy_core::ModstateDiff>,
    ) -> Result<(), PluginError> {
        for plugin in self.plugins.iter_mut() {
            let name = plugin.name().to_string();
            debug!(plugin = %name, "datastore upgrade");
            plugin
                .datastore_upgrade(tree, msdiff)
                .map_err(|source| PluginError::Callback {
                    plugin: name,
                    context: "datastore-upgrade".to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Run every plugin's module upgrade for one namespace.
    pub fn module_upgrade(
        &mut self,
        tree: &mut canopy_tree::ConfigTree,
        namespace: &str,
        from: canopy_core::Revision,
        to: canopy_core::Revision,
    ) -> Result<(), PluginError> {
        for plugin in self.plugins.iter_mut() {
            let name = plugin.name().to_string();
            debug!(plugin = %name, namespace, "module upgrade");
            plugin
                .module_upgrade(tree, namespace, from, to)
                .map_err(|source| PluginError::Callback {
                    plugin: name,
                    context: "module-upgrade".to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Run `abort` in reverse order over the first `begun` plugins.
    /// Best-effort: failures are logged and skipped.
    pub fn abort(&mut self, txn: &mut TxnView, begun: usize) {
        let begun = begun.min(self.plugins.len());
        for plugin in self.plugins[..begun].iter_mut().rev() {
            if let Err(e) = Self::dispatch(plugin, Phase::Abort, txn) {
                warn!(error = %e, "plugin abort failed, continuing");
            }
        }
    }
}
