//! Default fill-in.
//!
//! Missing leaves with YANG defaults are materialized before
//! validation, flagged `DEFAULT` so they can be stripped again.
//! Non-presence containers cascade: a container is created when
//! something beneath it carries a default.

use canopy_core::{Flags, NodeId, SpecId};
use canopy_tree::{ConfigTree, TreeResult};
use canopy_yang::{SpecKind, YangSpec};

pub(crate) fn fill_defaults(spec: &YangSpec, tree: &mut ConfigTree) -> TreeResult<()> {
    let root = tree.root();
    for module in spec.modules() {
        let top = spec.spec(module.root).children.clone();
        fill_children(spec, tree, root, &top, Some(&module.namespace))?;
    }
    Ok(())
}

/// Strip every node synthesized by default fill-in.
pub(crate) fn strip_defaults(tree: &mut ConfigTree) -> TreeResult<()> {
    let defaulted: Vec<NodeId> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|n| tree.flags(*n).contains(Flags::DEFAULT))
        .collect();
    for node in defaulted {
        if tree.contains(node) {
            tree.remove(node)?;
        }
    }
    Ok(())
}

fn fill_children(
    spec: &YangSpec,
    tree: &mut ConfigTree,
    parent: NodeId,
    child_specs: &[SpecId],
    namespace: Option<&str>,
) -> TreeResult<()> {
    for child_spec in child_specs {
        let cs = spec.spec(*child_spec);
        match &cs.kind {
            SpecKind::Leaf { default: Some(d), .. } => {
                if instance_of(tree, parent, &cs.name).is_none() {
                    let leaf = tree.add_leaf(parent, cs.name.clone(), namespace, d.clone())?;
                    tree.set_spec(leaf, Some(*child_spec))?;
                    tree.set_flag(leaf, Flags::DEFAULT)?;
                }
            }
            SpecKind::Container { presence: false } => {
                let grandchildren = cs.children.clone();
                match instance_of(tree, parent, &cs.name) {
                    Some(instance) => {
                        fill_children(spec, tree, instance, &grandchildren, None)?;
                    }
                    None if has_defaults(spec, *child_spec) => {
                        let container =
                            tree.add_element(parent, cs.name.clone(), namespace)?;
                        tree.set_spec(container, Some(*child_spec))?;
                        tree.set_flag(container, Flags::DEFAULT)?;
                        fill_children(spec, tree, container, &grandchildren, None)?;
                    }
                    None => {}
                }
            }
            SpecKind::Container { presence: true } => {
                // Presence containers only cascade when instantiated.
                if let Some(instance) = instance_of(tree, parent, &cs.name) {
                    let grandchildren = cs.children.clone();
                    fill_children(spec, tree, instance, &grandchildren, None)?;
                }
            }
            SpecKind::List { .. } => {
                let grandchildren = cs.children.clone();
                let instances: Vec<NodeId> = tree
                    .child_elements(parent)
                    .filter(|n| tree.spec(*n) == Some(*child_spec))
                    .collect();
                for instance in instances {
                    fill_children(spec, tree, instance, &grandchildren, None)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn instance_of(tree: &ConfigTree, parent: NodeId, name: &str) -> Option<NodeId> {
    tree.child_elements(parent)
        .find(|c| tree.name(*c).map(|n| n == name).unwrap_or(false))
}

fn has_defaults(spec: &YangSpec, id: SpecId) -> bool {
    let s = spec.spec(id);
    match &s.kind {
        SpecKind::Leaf { default, .. } => default.is_some(),
        SpecKind::Container { presence: false } => {
            s.children.iter().any(|c| has_defaults(spec, *c))
        }
        _ => false,
    }
}
