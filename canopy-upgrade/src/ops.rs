//! Changelog step operations.

use canopy_core::NodeId;
use canopy_tree::{ConfigTree, Expr, Path, ValueExpr};
use tracing::debug;

use crate::changelog::{Step, StepOp};
use crate::error::{UpgradeError, UpgradeResult};

fn parse_path(expr: &str) -> UpgradeResult<Path> {
    Path::parse(expr).map_err(|source| UpgradeError::BadExpression {
        expr: expr.to_string(),
        source,
    })
}

fn parse_expr(expr: &str) -> UpgradeResult<Expr> {
    Expr::parse(expr).map_err(|source| UpgradeError::BadExpression {
        expr: expr.to_string(),
        source,
    })
}

/// Apply one step: select targets by `where`, filter each through
/// `when`, then dispatch the operation.
pub(crate) fn apply_step(tree: &mut ConfigTree, step: &Step) -> UpgradeResult<()> {
    let targets = parse_path(&step.where_)?.select(tree, tree.root());
    let when = step.when.as_deref().map(parse_expr).transpose()?;
    debug!(op = step.op.as_str(), targets = targets.len(), "changelog step");
    for target in targets {
        // An earlier target's removal may have taken this one with it.
        if !tree.contains(target) {
            continue;
        }
        if let Some(guard) = &when {
            if !guard.eval(tree, target) {
                continue;
            }
        }
        match step.op {
            StepOp::Rename => rename(tree, target, step)?,
            StepOp::Replace => replace(tree, target, step)?,
            StepOp::Insert => insert(tree, target, step)?,
            StepOp::Delete => tree.remove(target)?,
            StepOp::Move => move_to(tree, target, step)?,
        }
    }
    Ok(())
}

fn rename(tree: &mut ConfigTree, target: NodeId, step: &Step) -> UpgradeResult<()> {
    let tag = step.tag.as_deref().ok_or(UpgradeError::MissingField {
        op: "rename",
        field: "tag",
    })?;
    let value = ValueExpr::parse(tag)
        .map_err(|source| UpgradeError::BadExpression {
            expr: tag.to_string(),
            source,
        })?
        .eval(tree, target);
    match value {
        Some(name) if !name.is_empty() => {
            tree.set_name(target, name)?;
            Ok(())
        }
        _ => Err(UpgradeError::EmptyRename(tag.to_string())),
    }
}

/// Replace the target wholesale with the embedded subtree: name,
/// namespace, attributes, body and children all come from `new`.
fn replace(tree: &mut ConfigTree, target: NodeId, step: &Step) -> UpgradeResult<()> {
    let new = step.new.as_ref().ok_or(UpgradeError::MissingField {
        op: "replace",
        field: "new",
    })?;
    tree.clear_children(target)?;
    tree.set_name(target, new.name.clone())?;
    if new.namespace.is_some() {
        tree.set_namespace(target, new.namespace.as_deref())?;
    }
    for (name, value) in &new.attributes {
        tree.add_attribute(target, name.clone(), value.clone())?;
    }
    if let Some(body) = &new.body {
        tree.add_body(target, body.clone())?;
    }
    for child in &new.children {
        tree.build_from_repr(target, child)?;
    }
    Ok(())
}

/// Insert the children of the embedded subtree under the target.
fn insert(tree: &mut ConfigTree, target: NodeId, step: &Step) -> UpgradeResult<()> {
    let new = step.new.as_ref().ok_or(UpgradeError::MissingField {
        op: "insert",
        field: "new",
    })?;
    for child in &new.children {
        tree.build_from_repr(target, child)?;
    }
    Ok(())
}

fn move_to(tree: &mut ConfigTree, target: NodeId, step: &Step) -> UpgradeResult<()> {
    let dst = step.dst.as_deref().ok_or(UpgradeError::MissingField {
        op: "move",
        field: "dst",
    })?;
    let parents = parse_path(dst)?.select(tree, tree.root());
    let parent = parents
        .first()
        .copied()
        .ok_or_else(|| UpgradeError::NoDestination(dst.to_string()))?;
    tree.move_node(target, parent)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_tree::NodeRepr;

    fn step(op: StepOp, where_: &str) -> Step {
        Step {
            op,
            where_: where_.to_string(),
            when: None,
            tag: None,
            dst: None,
            new: None,
        }
    }

    fn sample() -> ConfigTree {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let system = tree.add_element(root, "system", Some("urn:example:sys")).unwrap();
        tree.add_leaf(system, "hostname", None, "router1").unwrap();
        let ntp = tree.add_element(system, "ntp", None).unwrap();
        tree.add_leaf(ntp, "server", None, "10.0.0.1").unwrap();
        tree
    }

    #[test]
    fn test_rename_with_literal_tag() {
        // GIVEN
        let mut tree = sample();
        let mut s = step(StepOp::Rename, "/system/hostname");
        s.tag = Some("'host-name'".to_string());

        // WHEN
        apply_step(&mut tree, &s).unwrap();

        // THEN
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert!(tree.find_child(system, "host-name").unwrap().is_some());
        assert_eq!(tree.find_child(system, "hostname").unwrap(), None);
    }

    #[test]
    fn test_rename_to_same_name_is_noop() {
        // GIVEN
        let mut tree = sample();
        let before = tree.to_json().unwrap();
        let mut s = step(StepOp::Rename, "/system/hostname");
        s.tag = Some("'hostname'".to_string());

        // WHEN - applied twice
        apply_step(&mut tree, &s).unwrap();
        apply_step(&mut tree, &s).unwrap();

        // THEN
        assert_eq!(tree.to_json().unwrap(), before);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        // GIVEN
        let mut tree = sample();
        let before = tree.to_json().unwrap();

        // WHEN - where matches nothing
        apply_step(&mut tree, &step(StepOp::Delete, "/system/ghost")).unwrap();

        // THEN
        assert_eq!(tree.to_json().unwrap(), before);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut tree = sample();
        let s = step(StepOp::Delete, "/system/ntp");
        apply_step(&mut tree, &s).unwrap();
        let after_once = tree.to_json().unwrap();
        apply_step(&mut tree, &s).unwrap();
        assert_eq!(tree.to_json().unwrap(), after_once);
    }

    #[test]
    fn test_when_guard_skips_targets() {
        // GIVEN - guard false for the target
        let mut tree = sample();
        let mut s = step(StepOp::Delete, "/system/ntp");
        s.when = Some("server = '192.168.0.1'".to_string());

        // WHEN
        apply_step(&mut tree, &s).unwrap();

        // THEN - ntp survives
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert!(tree.find_child(system, "ntp").unwrap().is_some());
    }

    #[test]
    fn test_replace_swaps_subtree() {
        // GIVEN
        let mut tree = sample();
        let mut s = step(StepOp::Replace, "/system/ntp");
        s.new = Some(
            NodeRepr::element("time")
                .with_child(NodeRepr::element("source").with_body("ntp.example.org")),
        );

        // WHEN
        apply_step(&mut tree, &s).unwrap();

        // THEN
        let system = tree.child_elements(tree.root()).next().unwrap();
        let time = tree.find_child(system, "time").unwrap().unwrap();
        assert_eq!(
            tree.child_body(time, "source").unwrap(),
            Some("ntp.example.org".to_string())
        );
        assert_eq!(tree.find_child(system, "ntp").unwrap(), None);
    }

    #[test]
    fn test_insert_appends_children() {
        // GIVEN
        let mut tree = sample();
        let mut s = step(StepOp::Insert, "/system");
        s.new = Some(
            NodeRepr::element("new").with_child(NodeRepr::element("location").with_body("lab")),
        );

        // WHEN
        apply_step(&mut tree, &s).unwrap();

        // THEN
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert_eq!(
            tree.child_body(system, "location").unwrap(),
            Some("lab".to_string())
        );
    }

    #[test]
    fn test_move_reparents() {
        // GIVEN
        let mut tree = sample();
        let mut s = step(StepOp::Move, "/system/ntp/server");
        s.dst = Some("/system".to_string());

        // WHEN
        apply_step(&mut tree, &s).unwrap();

        // THEN
        let system = tree.child_elements(tree.root()).next().unwrap();
        assert_eq!(
            tree.child_body(system, "server").unwrap(),
            Some("10.0.0.1".to_string())
        );
        let ntp = tree.find_child(system, "ntp").unwrap().unwrap();
        assert_eq!(tree.find_child(ntp, "server").unwrap(), None);
    }

    #[test]
    fn test_missing_required_field_fails() {
        let mut tree = sample();
        let err = apply_step(&mut tree, &step(StepOp::Rename, "/system/hostname")).unwrap_err();
        assert!(matches!(err, UpgradeError::MissingField { op: "rename", .. }));
    }
}
