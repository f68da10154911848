//! Programmatic upgrade callback registry.

use canopy_core::{ModstateDiff, Revision};
use canopy_tree::ConfigTree;
use tracing::info;

use crate::error::UpgradeResult;

/// A module upgrade callback: transform the tree for one namespace
/// whose stored revision (`from`) differs from the schema's (`to`).
pub type ModuleUpgradeFn =
    Box<dyn FnMut(&mut ConfigTree, &str, Revision, Revision) -> UpgradeResult<()>>;

struct Registration {
    /// Restrict to one namespace, or fire for every differing module.
    namespace: Option<String>,
    callback: ModuleUpgradeFn,
}

/// Ordered registry of module upgrade callbacks.
#[derive(Default)]
pub struct UpgradeRegistry {
    registrations: Vec<Registration>,
}

impl UpgradeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, optionally scoped to one namespace.
    pub fn register(&mut self, namespace: Option<&str>, callback: ModuleUpgradeFn) {
        self.registrations.push(Registration {
            namespace: namespace.map(str::to_string),
            callback,
        });
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run the callbacks for every module the diff names, in
    /// registration order per module.
    pub fn run(&mut self, tree: &mut ConfigTree, msdiff: &ModstateDiff) -> UpgradeResult<()> {
        for delta in &msdiff.entries {
            for reg in self.registrations.iter_mut() {
                let applies = reg
                    .namespace
                    .as_deref()
                    .map(|ns| ns == delta.namespace)
                    .unwrap_or(true);
                if !applies {
                    continue;
                }
                info!(
                    namespace = %delta.namespace,
                    from = %delta.from,
                    to = %delta.to,
                    "running module upgrade callback"
                );
                (reg.callback)(tree, &delta.namespace, delta.from, delta.to)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{ModstateDelta, ModstateStatus};

    fn diff_for(ns: &str) -> ModstateDiff {
        ModstateDiff {
            entries: vec![ModstateDelta {
                name: "m".to_string(),
                namespace: ns.to_string(),
                from: Revision(20230101),
                to: Revision(20240101),
            }],
            status: ModstateStatus::Other,
        }
    }

    #[test]
    fn test_namespace_scoping() {
        // GIVEN - one scoped and one catch-all callback
        let mut registry = UpgradeRegistry::new();
        let hits = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let h1 = hits.clone();
        registry.register(
            Some("urn:a"),
            Box::new(move |_, ns, _, _| {
                h1.borrow_mut().push(format!("scoped:{}", ns));
                Ok(())
            }),
        );
        let h2 = hits.clone();
        registry.register(
            None,
            Box::new(move |_, ns, _, _| {
                h2.borrow_mut().push(format!("all:{}", ns));
                Ok(())
            }),
        );

        // WHEN - upgrade for a different namespace
        let mut tree = ConfigTree::new();
        registry.run(&mut tree, &diff_for("urn:b")).unwrap();

        // THEN - only the catch-all fired
        assert_eq!(*hits.borrow(), vec!["all:urn:b"]);
    }

    #[test]
    fn test_callback_failure_stops_upgrade() {
        let mut registry = UpgradeRegistry::new();
        registry.register(
            None,
            Box::new(|_, ns, _, _| {
                Err(crate::UpgradeError::Callback {
                    namespace: ns.to_string(),
                    message: "cannot".to_string(),
                })
            }),
        );
        let mut tree = ConfigTree::new();
        assert!(registry.run(&mut tree, &diff_for("urn:a")).is_err());
    }
}
