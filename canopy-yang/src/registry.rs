//! The immutable schema registry.

use std::collections::HashMap;

use canopy_core::{Modstate, ModuleId, SpecId};
use canopy_tree::Schema;

use crate::types::{Identity, Module, NodeSpec};

/// A built schema: modules, statements and identities.
///
/// Construct with [`crate::YangSpecBuilder`]. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct YangSpec {
    pub(crate) modules: Vec<Module>,
    pub(crate) specs: Vec<NodeSpec>,
    pub(crate) identities: HashMap<String, Identity>,
    pub(crate) by_namespace: HashMap<String, ModuleId>,
}

impl YangSpec {
    /// A statement by handle.
    ///
    /// Handles come from this registry, so lookups cannot miss; a stale
    /// handle from another registry is a logic error and panics.
    pub fn spec(&self, id: SpecId) -> &NodeSpec {
        &self.specs[id.raw() as usize]
    }

    /// A module by handle.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.raw() as usize]
    }

    /// All modules.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// The module declaring a namespace.
    pub fn module_by_namespace(&self, namespace: &str) -> Option<&Module> {
        self.by_namespace.get(namespace).map(|id| self.module(*id))
    }

    /// The module declaring a name.
    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// True if a module is present and has the feature enabled.
    pub fn feature_enabled(&self, module: &str, feature: &str) -> bool {
        self.module_by_name(module)
            .map(|m| m.features.contains(feature))
            .unwrap_or(false)
    }

    /// An identity by name.
    pub fn identity(&self, name: &str) -> Option<&Identity> {
        self.identities.get(name)
    }

    /// True if `name` is `base` or transitively derived from it.
    pub fn identity_derived_from(&self, name: &str, base: &str) -> bool {
        let mut cur = Some(name.to_string());
        while let Some(n) = cur {
            if n == base {
                return true;
            }
            cur = self.identities.get(&n).and_then(|i| i.base.clone());
        }
        false
    }

    /// The module-state record describing this schema's revisions,
    /// embedded into datastore files on save.
    pub fn modstate(&self) -> Modstate {
        let mut ms = Modstate::new();
        for module in &self.modules {
            ms.push(module.name.clone(), module.namespace.clone(), module.revision);
        }
        ms
    }
}

impl Schema for YangSpec {
    fn root_child(&self, namespace: Option<&str>, name: &str) -> Option<SpecId> {
        match namespace {
            Some(ns) => {
                let module = self.by_namespace.get(ns)?;
                self.spec(self.module(*module).root).child(name)
            }
            None => self
                .modules
                .iter()
                .find_map(|m| self.spec(m.root).child(name)),
        }
    }

    fn child_of(&self, parent: SpecId, namespace: Option<&str>, name: &str) -> Option<SpecId> {
        let child = self.spec(parent).child(name)?;
        if let Some(ns) = namespace {
            let module = self.module(self.spec(child).module);
            if module.namespace != ns {
                return None;
            }
        }
        Some(child)
    }

    fn list_keys(&self, spec: SpecId) -> &[String] {
        self.spec(spec).keys()
    }

    fn is_leaf_list(&self, spec: SpecId) -> bool {
        self.spec(spec).is_leaf_list()
    }

    fn ordered_by_user(&self, spec: SpecId) -> bool {
        match &self.spec(spec).kind {
            crate::types::SpecKind::List { ordered_by_user, .. } => *ordered_by_user,
            crate::types::SpecKind::LeafList { ordered_by_user, .. } => *ordered_by_user,
            _ => false,
        }
    }
}
