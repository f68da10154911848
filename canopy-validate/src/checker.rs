//! The generic validator.

use std::collections::HashMap;

use canopy_core::{NodeId, RpcError, RpcErrors, SpecId};
use canopy_tree::{ConfigTree, Expr, Path, TreeResult};
use canopy_yang::{Must, SpecKind, TypeSpec, YangSpec};

use crate::defaults;
use crate::value::check_value;

/// Attributes the engine understands on config elements; anything else
/// is a `bad-attribute` error.
const ALLOWED_ATTRIBUTES: &[&str] = &["operation"];

/// Validates configuration trees against a schema.
pub struct Validator<'s> {
    spec: &'s YangSpec,
}

impl<'s> Validator<'s> {
    /// Create a validator over a schema.
    pub fn new(spec: &'s YangSpec) -> Self {
        Self { spec }
    }

    /// Materialize YANG defaults into the tree (marking them `DEFAULT`).
    pub fn fill_defaults(&self, tree: &mut ConfigTree) -> TreeResult<()> {
        defaults::fill_defaults(self.spec, tree)
    }

    /// Remove everything a previous fill-in added.
    pub fn strip_defaults(&self, tree: &mut ConfigTree) -> TreeResult<()> {
        defaults::strip_defaults(tree)
    }

    /// Validate a whole tree. Returns every violation found.
    pub fn validate_all_top(&self, tree: &ConfigTree) -> RpcErrors {
        let mut errors = RpcErrors::new();
        let root = tree.root();
        let top_specs: Vec<SpecId> = self
            .spec
            .modules()
            .iter()
            .flat_map(|m| self.spec.spec(m.root).children.clone())
            .collect();
        self.check_children(tree, root, &top_specs, &mut errors);
        for child in tree.child_elements(root).collect::<Vec<_>>() {
            self.validate_node(tree, child, &mut errors);
        }
        errors
    }

    /// Validate a single subtree with the same checks.
    pub fn validate_add(&self, tree: &ConfigTree, node: NodeId) -> RpcErrors {
        let mut errors = RpcErrors::new();
        self.validate_node(tree, node, &mut errors);
        errors
    }

    /// Reject state (non-config) nodes, which have no business in a
    /// configuration datastore.
    pub fn reject_state_data(&self, tree: &ConfigTree) -> RpcErrors {
        let mut errors = RpcErrors::new();
        for node in tree.descendants(tree.root()) {
            if let Some(spec) = tree.spec(node) {
                if !self.spec.spec(spec).config {
                    errors.push(RpcError::invalid_value(
                        tree.path_of(node),
                        "state data not allowed in a configuration datastore",
                    ));
                }
            }
        }
        errors
    }

    // ========== Per-node checks ==========

    fn validate_node(&self, tree: &ConfigTree, node: NodeId, errors: &mut RpcErrors) {
        let spec_id = match tree.spec(node) {
            Some(s) => s,
            None => {
                errors.push(RpcError::unknown_element(
                    tree.path_of(node),
                    format!(
                        "unknown element: {}",
                        tree.name(node).unwrap_or("?")
                    ),
                ));
                return;
            }
        };
        let spec = self.spec.spec(spec_id);

        for (attr, _) in tree.attributes(node) {
            if !ALLOWED_ATTRIBUTES.contains(&attr.as_str()) {
                errors.push(RpcError::bad_attribute(
                    tree.path_of(node),
                    format!("attribute {:?} not allowed", attr),
                ));
            }
        }

        self.check_musts(tree, node, &spec.musts, errors);

        match &spec.kind {
            SpecKind::Leaf { ty, .. } => {
                self.check_leaf_value(tree, node, ty, errors);
            }
            SpecKind::LeafList { ty, .. } => {
                self.check_leaf_value(tree, node, ty, errors);
            }
            SpecKind::Container { .. } => {
                self.check_children(tree, node, &spec.children, errors);
                for child in tree.child_elements(node).collect::<Vec<_>>() {
                    self.validate_node(tree, child, errors);
                }
            }
            SpecKind::List { keys, .. } => {
                for key in keys {
                    let present = tree
                        .find_child(node, key)
                        .ok()
                        .flatten()
                        .is_some();
                    if !present {
                        errors.push(RpcError::missing_element(
                            tree.path_of(node),
                            format!("list key {:?} missing", key),
                        ));
                    }
                }
                self.check_children(tree, node, &spec.children, errors);
                for child in tree.child_elements(node).collect::<Vec<_>>() {
                    self.validate_node(tree, child, errors);
                }
            }
        }
    }

    fn check_leaf_value(
        &self,
        tree: &ConfigTree,
        node: NodeId,
        ty: &TypeSpec,
        errors: &mut RpcErrors,
    ) {
        let body = tree.body(node).ok().flatten().unwrap_or_default();
        if let Err(reason) = check_value(self.spec, ty, &body) {
            errors.push(RpcError::invalid_value(tree.path_of(node), reason));
            return;
        }
        if let TypeSpec::LeafRef { path } = ty {
            self.check_leafref(tree, node, path, &body, errors);
        }
    }

    fn check_leafref(
        &self,
        tree: &ConfigTree,
        node: NodeId,
        path: &str,
        value: &str,
        errors: &mut RpcErrors,
    ) {
        let parsed = match Path::parse(path) {
            Ok(p) => p,
            Err(e) => {
                errors.push(RpcError::operation_failed(
                    canopy_core::ErrorType::Application,
                    format!("unusable leafref path {:?}: {}", path, e),
                ));
                return;
            }
        };
        let resolved = parsed
            .select(tree, node)
            .iter()
            .any(|t| tree.body(*t).ok().flatten().as_deref() == Some(value));
        if !resolved {
            errors.push(
                RpcError::data_missing(
                    tree.path_of(node),
                    format!("required instance {:?} does not exist", value),
                )
                .with_app_tag("instance-required"),
            );
        }
    }

    fn check_musts(
        &self,
        tree: &ConfigTree,
        node: NodeId,
        musts: &[Must],
        errors: &mut RpcErrors,
    ) {
        for must in musts {
            let expr = match Expr::parse(&must.expr) {
                Ok(e) => e,
                Err(e) => {
                    errors.push(RpcError::operation_failed(
                        canopy_core::ErrorType::Application,
                        format!("unusable must expression {:?}: {}", must.expr, e),
                    ));
                    continue;
                }
            };
            if !expr.eval(tree, node) {
                let message = must
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("must condition failed: {}", must.expr));
                errors.push(
                    RpcError::operation_failed(canopy_core::ErrorType::Application, message)
                        .with_path(tree.path_of(node))
                        .with_app_tag(
                            must.error_app_tag
                                .clone()
                                .unwrap_or_else(|| "must-violation".to_string()),
                        ),
                );
            }
        }
    }

    // ========== Sibling-set checks ==========

    /// Cardinality, uniqueness and `when` checks for the children of
    /// one parent node, driven by the parent's child statements.
    fn check_children(
        &self,
        tree: &ConfigTree,
        parent: NodeId,
        child_specs: &[SpecId],
        errors: &mut RpcErrors,
    ) {
        // Instances grouped by bound statement.
        let mut by_spec: HashMap<SpecId, Vec<NodeId>> = HashMap::new();
        for child in tree.child_elements(parent) {
            if let Some(s) = tree.spec(child) {
                by_spec.entry(s).or_default().push(child);
            }
        }

        for spec_id in child_specs {
            let cs = self.spec.spec(*spec_id);
            let instances = by_spec.get(spec_id).cloned().unwrap_or_default();
            let count = instances.len() as u32;

            if let Some(when) = &cs.when {
                let satisfied = Expr::parse(when)
                    .map(|e| e.eval(tree, parent))
                    .unwrap_or(false);
                if !satisfied {
                    for instance in &instances {
                        errors.push(RpcError::unknown_element(
                            tree.path_of(*instance),
                            "element not allowed here: when condition is false",
                        ));
                    }
                    continue;
                }
            }

            match &cs.kind {
                SpecKind::Leaf { mandatory, .. } => {
                    if *mandatory && count == 0 {
                        errors.push(RpcError::missing_element(
                            format!("{}/{}", tree.path_of(parent), cs.name),
                            format!("mandatory leaf {:?} missing", cs.name),
                        ));
                    }
                    if count > 1 {
                        errors.push(RpcError::data_exists(
                            tree.path_of(instances[1]),
                            format!("leaf {:?} occurs more than once", cs.name),
                        ));
                    }
                }
                SpecKind::Container { .. } => {
                    if count > 1 {
                        errors.push(RpcError::data_exists(
                            tree.path_of(instances[1]),
                            format!("container {:?} occurs more than once", cs.name),
                        ));
                    }
                }
                SpecKind::List {
                    keys,
                    min_elements,
                    max_elements,
                    unique,
                    ..
                } => {
                    self.check_element_count(
                        tree, parent, &cs.name, count, *min_elements, *max_elements, errors,
                    );
                    self.check_key_uniqueness(tree, &instances, keys, errors);
                    for tuple in unique {
                        self.check_unique_tuple(tree, &instances, tuple, errors);
                    }
                }
                SpecKind::LeafList {
                    min_elements,
                    max_elements,
                    ..
                } => {
                    self.check_element_count(
                        tree, parent, &cs.name, count, *min_elements, *max_elements, errors,
                    );
                    let mut seen: Vec<String> = Vec::new();
                    for instance in &instances {
                        let body = tree.body(*instance).ok().flatten().unwrap_or_default();
                        if seen.contains(&body) {
                            errors.push(RpcError::data_exists(
                                tree.path_of(*instance),
                                format!("duplicate leaf-list entry {:?}", body),
                            ));
                        }
                        seen.push(body);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_element_count(
        &self,
        tree: &ConfigTree,
        parent: NodeId,
        name: &str,
        count: u32,
        min_elements: u32,
        max_elements: Option<u32>,
        errors: &mut RpcErrors,
    ) {
        if count < min_elements {
            errors.push(
                RpcError::data_missing(
                    format!("{}/{}", tree.path_of(parent), name),
                    format!(
                        "{:?} has {} entries, fewer than min-elements {}",
                        name, count, min_elements
                    ),
                )
                .with_app_tag("too-few-elements"),
            );
        }
        if let Some(max) = max_elements {
            if count > max {
                errors.push(
                    RpcError::operation_failed(
                        canopy_core::ErrorType::Application,
                        format!(
                            "{:?} has {} entries, more than max-elements {}",
                            name, count, max
                        ),
                    )
                    .with_path(format!("{}/{}", tree.path_of(parent), name))
                    .with_app_tag("too-many-elements"),
                );
            }
        }
    }

    fn check_key_uniqueness(
        &self,
        tree: &ConfigTree,
        instances: &[NodeId],
        keys: &[String],
        errors: &mut RpcErrors,
    ) {
        let mut seen: Vec<Vec<Option<String>>> = Vec::new();
        for instance in instances {
            let tuple: Vec<Option<String>> = keys
                .iter()
                .map(|k| tree.child_body(*instance, k).ok().flatten())
                .collect();
            if seen.contains(&tuple) {
                errors.push(RpcError::data_exists(
                    tree.path_of(*instance),
                    "duplicate list key",
                ));
            }
            seen.push(tuple);
        }
    }

    fn check_unique_tuple(
        &self,
        tree: &ConfigTree,
        instances: &[NodeId],
        tuple: &[String],
        errors: &mut RpcErrors,
    ) {
        let mut seen: Vec<Vec<Option<String>>> = Vec::new();
        for instance in instances {
            let values: Vec<Option<String>> = tuple
                .iter()
                .map(|leaf| tree.child_body(*instance, leaf).ok().flatten())
                .collect();
            // Entries with absent leaves never conflict.
            if values.iter().any(|v| v.is_none()) {
                continue;
            }
            if seen.contains(&values) {
                errors.push(
                    RpcError::operation_failed(
                        canopy_core::ErrorType::Application,
                        format!("unique constraint on ({}) violated", tuple.join(", ")),
                    )
                    .with_path(tree.path_of(*instance))
                    .with_app_tag("data-not-unique"),
                );
            }
            seen.push(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::ErrorTag;
    use canopy_yang::{ContainerDef, LeafDef, LeafListDef, ListDef, YangSpecBuilder};

    fn sample_spec() -> YangSpec {
        YangSpecBuilder::new()
            .module("example-system", "urn:example:sys", "2024-01-15", |m| {
                m.container(
                    ContainerDef::new("system")
                        .with_must(Must::new("count(server) <= 2").with_message("at most two servers")),
                    |c| {
                        c.leaf(LeafDef::new("hostname", TypeSpec::string()).mandatory());
                        c.leaf(LeafDef::new("mtu", TypeSpec::uint16()).with_default("1500"));
                        c.list(
                            ListDef::new("server", &["name"]).min_elements(1).unique(&["port"]),
                            |l| {
                                l.leaf(LeafDef::new("name", TypeSpec::string()));
                                l.leaf(LeafDef::new("port", TypeSpec::uint16()).with_default("22"));
                            },
                        );
                        c.leaf_list(LeafListDef::new("dns", TypeSpec::string()).max_elements(2));
                        c.leaf(LeafDef::new(
                            "primary-server",
                            TypeSpec::leafref("../server/name"),
                        ));
                    },
                );
            })
            .build()
            .unwrap()
    }

    fn base_tree(spec: &YangSpec) -> (ConfigTree, NodeId) {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let system = tree
            .add_element(root, "system", Some("urn:example:sys"))
            .unwrap();
        tree.add_leaf(system, "hostname", None, "router1").unwrap();
        let server = tree.add_element(system, "server", None).unwrap();
        tree.add_leaf(server, "name", None, "s1").unwrap();
        tree.bind(spec).unwrap();
        (tree, system)
    }

    #[test]
    fn test_valid_tree_passes() {
        // GIVEN
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, _) = base_tree(&spec);

        // WHEN
        validator.fill_defaults(&mut tree).unwrap();
        let errors = validator.validate_all_top(&tree);

        // THEN
        assert!(errors.is_empty(), "unexpected: {}", errors);
    }

    #[test]
    fn test_default_satisfies_mandatory_style_checks() {
        // GIVEN - mtu has a default and no explicit value
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);

        // WHEN
        validator.fill_defaults(&mut tree).unwrap();

        // THEN - the default was materialized and validation passes
        assert_eq!(
            tree.child_body(system, "mtu").unwrap(),
            Some("1500".to_string())
        );
        assert!(validator.validate_all_top(&tree).is_empty());

        // WHEN - stripped again
        validator.strip_defaults(&mut tree).unwrap();

        // THEN
        assert_eq!(tree.child_body(system, "mtu").unwrap(), None);
    }

    #[test]
    fn test_mandatory_leaf_missing() {
        // GIVEN - no hostname
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let system = tree
            .add_element(root, "system", Some("urn:example:sys"))
            .unwrap();
        let server = tree.add_element(system, "server", None).unwrap();
        tree.add_leaf(server, "name", None, "s1").unwrap();
        tree.bind(&spec).unwrap();

        // WHEN
        let errors = validator.validate_all_top(&tree);

        // THEN
        assert_eq!(errors.first().map(|e| e.tag), Some(ErrorTag::MissingElement));
    }

    #[test]
    fn test_bad_integer_value() {
        // GIVEN
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);
        tree.add_leaf(system, "mtu", None, "not-a-number").unwrap();
        tree.bind(&spec).unwrap();

        // WHEN
        let errors = validator.validate_all_top(&tree);

        // THEN
        let err = errors.first().unwrap();
        assert_eq!(err.tag, ErrorTag::InvalidValue);
        assert_eq!(err.path.as_deref(), Some("/system/mtu"));
    }

    #[test]
    fn test_min_elements_violation_is_data_missing() {
        // GIVEN - server list requires one entry
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let system = tree
            .add_element(root, "system", Some("urn:example:sys"))
            .unwrap();
        tree.add_leaf(system, "hostname", None, "r1").unwrap();
        tree.bind(&spec).unwrap();

        // WHEN
        let errors = validator.validate_all_top(&tree);

        // THEN
        let err = errors.first().unwrap();
        assert_eq!(err.tag, ErrorTag::DataMissing);
        assert_eq!(err.app_tag.as_deref(), Some("too-few-elements"));
    }

    #[test]
    fn test_must_violation() {
        // GIVEN - three servers against count(server) <= 2
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);
        for name in ["s2", "s3"] {
            let server = tree.add_element(system, "server", None).unwrap();
            tree.add_leaf(server, "name", None, name).unwrap();
        }
        tree.bind(&spec).unwrap();

        // WHEN
        let errors = validator.validate_all_top(&tree);

        // THEN
        let err = errors.first().unwrap();
        assert_eq!(err.tag, ErrorTag::OperationFailed);
        assert_eq!(err.message, "at most two servers");
        assert_eq!(err.app_tag.as_deref(), Some("must-violation"));
    }

    #[test]
    fn test_duplicate_list_key() {
        // GIVEN
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);
        let server = tree.add_element(system, "server", None).unwrap();
        tree.add_leaf(server, "name", None, "s1").unwrap();
        tree.bind(&spec).unwrap();

        // WHEN
        let errors = validator.validate_all_top(&tree);

        // THEN
        assert!(errors
            .all()
            .iter()
            .any(|e| e.tag == ErrorTag::DataExists && e.message.contains("duplicate list key")));
    }

    #[test]
    fn test_unique_constraint() {
        // GIVEN - two servers sharing a port
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);
        let s1 = tree.find_child(system, "server").unwrap().unwrap();
        tree.add_leaf(s1, "port", None, "2022").unwrap();
        let s2 = tree.add_element(system, "server", None).unwrap();
        tree.add_leaf(s2, "name", None, "s2").unwrap();
        tree.add_leaf(s2, "port", None, "2022").unwrap();
        tree.bind(&spec).unwrap();

        // WHEN
        let errors = validator.validate_all_top(&tree);

        // THEN
        assert!(errors
            .all()
            .iter()
            .any(|e| e.app_tag.as_deref() == Some("data-not-unique")));
    }

    #[test]
    fn test_leafref_resolution() {
        // GIVEN - primary-server pointing at a present, then absent name
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);
        tree.add_leaf(system, "primary-server", None, "s1").unwrap();
        tree.bind(&spec).unwrap();
        assert!(validator.validate_all_top(&tree).is_empty());

        // WHEN - retarget to a missing entry
        let leaf = tree.find_child(system, "primary-server").unwrap().unwrap();
        tree.set_body(leaf, "ghost").unwrap();
        let errors = validator.validate_all_top(&tree);

        // THEN
        let err = errors.first().unwrap();
        assert_eq!(err.tag, ErrorTag::DataMissing);
        assert_eq!(err.app_tag.as_deref(), Some("instance-required"));
    }

    #[test]
    fn test_max_elements_violation() {
        // GIVEN - three dns entries against max-elements 2
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);
        for d in ["a", "b", "c"] {
            tree.add_leaf(system, "dns", None, d).unwrap();
        }
        tree.bind(&spec).unwrap();

        // WHEN
        let errors = validator.validate_all_top(&tree);

        // THEN
        assert!(errors
            .all()
            .iter()
            .any(|e| e.app_tag.as_deref() == Some("too-many-elements")));
    }

    #[test]
    fn test_validate_add_scopes_to_subtree() {
        // GIVEN - an invalid mtu outside the added subtree
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let (mut tree, system) = base_tree(&spec);
        tree.add_leaf(system, "mtu", None, "99999").unwrap();
        tree.bind(&spec).unwrap();
        let server = tree.find_child(system, "server").unwrap().unwrap();

        // WHEN - validating only the server subtree
        let errors = validator.validate_add(&tree, server);

        // THEN - the mtu error is not reported
        assert!(errors.is_empty(), "unexpected: {}", errors);
    }

    #[test]
    fn test_empty_tree_passes() {
        let spec = sample_spec();
        let validator = Validator::new(&spec);
        let tree = ConfigTree::new();
        assert!(validator.validate_all_top(&tree).is_empty());
    }
}
