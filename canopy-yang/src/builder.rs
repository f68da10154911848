//! Fluent schema builder.
//!
//! Statement definitions are plain def-structs with chained setters;
//! nesting is expressed with closures. All structural validation
//! (key resolution, identity bases, expression syntax) happens in
//! `build()`, so definition order inside a module does not matter.

use std::collections::{BTreeSet, HashMap};

use canopy_core::{ModuleId, Revision, SpecId};
use canopy_tree::{Expr, Path};

use crate::error::{SpecError, SpecResult};
use crate::registry::YangSpec;
use crate::types::{Identity, Module, Must, NodeSpec, SpecKind, TypeSpec};

/// Definition of a container statement.
#[derive(Debug, Clone)]
pub struct ContainerDef {
    name: String,
    presence: bool,
    config: bool,
    when: Option<String>,
    musts: Vec<Must>,
}

impl ContainerDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            presence: false,
            config: true,
            when: None,
            musts: Vec::new(),
        }
    }

    /// Mark as a presence container.
    pub fn presence(mut self) -> Self {
        self.presence = true;
        self
    }

    /// Mark as state (non-config) data.
    pub fn state(mut self) -> Self {
        self.config = false;
        self
    }

    /// Attach a `when` guard.
    pub fn with_when(mut self, expr: impl Into<String>) -> Self {
        self.when = Some(expr.into());
        self
    }

    /// Attach a `must` constraint.
    pub fn with_must(mut self, must: Must) -> Self {
        self.musts.push(must);
        self
    }
}

/// Definition of a list statement.
#[derive(Debug, Clone)]
pub struct ListDef {
    name: String,
    keys: Vec<String>,
    min_elements: u32,
    max_elements: Option<u32>,
    unique: Vec<Vec<String>>,
    ordered_by_user: bool,
    config: bool,
    when: Option<String>,
    musts: Vec<Must>,
}

impl ListDef {
    pub fn new(name: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            name: name.into(),
            keys: keys.iter().map(|s| s.to_string()).collect(),
            min_elements: 0,
            max_elements: None,
            unique: Vec::new(),
            ordered_by_user: false,
            config: true,
            when: None,
            musts: Vec::new(),
        }
    }

    pub fn min_elements(mut self, n: u32) -> Self {
        self.min_elements = n;
        self
    }

    pub fn max_elements(mut self, n: u32) -> Self {
        self.max_elements = Some(n);
        self
    }

    /// Add a `unique` tuple of child leaf names.
    pub fn unique(mut self, leaves: &[&str]) -> Self {
        self.unique.push(leaves.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn ordered_by_user(mut self) -> Self {
        self.ordered_by_user = true;
        self
    }

    pub fn state(mut self) -> Self {
        self.config = false;
        self
    }

    pub fn with_when(mut self, expr: impl Into<String>) -> Self {
        self.when = Some(expr.into());
        self
    }

    pub fn with_must(mut self, must: Must) -> Self {
        self.musts.push(must);
        self
    }
}

/// Definition of a leaf statement.
#[derive(Debug, Clone)]
pub struct LeafDef {
    name: String,
    ty: TypeSpec,
    default: Option<String>,
    mandatory: bool,
    config: bool,
    when: Option<String>,
    musts: Vec<Must>,
}

impl LeafDef {
    pub fn new(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            mandatory: false,
            config: true,
            when: None,
            musts: Vec::new(),
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn state(mut self) -> Self {
        self.config = false;
        self
    }

    pub fn with_when(mut self, expr: impl Into<String>) -> Self {
        self.when = Some(expr.into());
        self
    }

    pub fn with_must(mut self, must: Must) -> Self {
        self.musts.push(must);
        self
    }
}

/// Definition of a leaf-list statement.
#[derive(Debug, Clone)]
pub struct LeafListDef {
    name: String,
    ty: TypeSpec,
    min_elements: u32,
    max_elements: Option<u32>,
    ordered_by_user: bool,
    config: bool,
    when: Option<String>,
    musts: Vec<Must>,
}

impl LeafListDef {
    pub fn new(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            min_elements: 0,
            max_elements: None,
            ordered_by_user: false,
            config: true,
            when: None,
            musts: Vec::new(),
        }
    }

    pub fn min_elements(mut self, n: u32) -> Self {
        self.min_elements = n;
        self
    }

    pub fn max_elements(mut self, n: u32) -> Self {
        self.max_elements = Some(n);
        self
    }

    pub fn ordered_by_user(mut self) -> Self {
        self.ordered_by_user = true;
        self
    }

    pub fn state(mut self) -> Self {
        self.config = false;
        self
    }

    pub fn with_when(mut self, expr: impl Into<String>) -> Self {
        self.when = Some(expr.into());
        self
    }

    pub fn with_must(mut self, must: Must) -> Self {
        self.musts.push(must);
        self
    }
}

/// Builder for child statements of one parent.
pub struct NodeBuilder<'a> {
    specs: &'a mut Vec<NodeSpec>,
    errors: &'a mut Vec<SpecError>,
    id: SpecId,
    module: ModuleId,
}

impl<'a> NodeBuilder<'a> {
    fn add_child(
        &mut self,
        name: String,
        kind: SpecKind,
        config: bool,
        when: Option<String>,
        musts: Vec<Must>,
    ) -> SpecId {
        let parent_name = self.specs[self.id.raw() as usize].name.clone();
        if self.specs[self.id.raw() as usize].child(&name).is_some() {
            self.errors.push(SpecError::DuplicateChild {
                parent: parent_name,
                name: name.clone(),
            });
        }
        let id = SpecId::new(self.specs.len() as u32);
        self.specs.push(NodeSpec {
            id,
            module: self.module,
            name: name.clone(),
            kind,
            config,
            when,
            musts,
            children: Vec::new(),
            child_index: HashMap::new(),
        });
        let parent = &mut self.specs[self.id.raw() as usize];
        parent.children.push(id);
        parent.child_index.insert(name, id);
        id
    }

    /// Add a container and populate its children.
    pub fn container(
        &mut self,
        def: ContainerDef,
        f: impl FnOnce(&mut NodeBuilder),
    ) -> &mut Self {
        let id = self.add_child(
            def.name,
            SpecKind::Container { presence: def.presence },
            def.config,
            def.when,
            def.musts,
        );
        let mut child = NodeBuilder {
            specs: &mut *self.specs,
            errors: &mut *self.errors,
            id,
            module: self.module,
        };
        f(&mut child);
        self
    }

    /// Add a list and populate its children.
    pub fn list(&mut self, def: ListDef, f: impl FnOnce(&mut NodeBuilder)) -> &mut Self {
        let id = self.add_child(
            def.name,
            SpecKind::List {
                keys: def.keys,
                min_elements: def.min_elements,
                max_elements: def.max_elements,
                unique: def.unique,
                ordered_by_user: def.ordered_by_user,
            },
            def.config,
            def.when,
            def.musts,
        );
        let mut child = NodeBuilder {
            specs: &mut *self.specs,
            errors: &mut *self.errors,
            id,
            module: self.module,
        };
        f(&mut child);
        self
    }

    /// Add a leaf.
    pub fn leaf(&mut self, def: LeafDef) -> &mut Self {
        self.add_child(
            def.name,
            SpecKind::Leaf {
                ty: def.ty,
                default: def.default,
                mandatory: def.mandatory,
            },
            def.config,
            def.when,
            def.musts,
        );
        self
    }

    /// Add a leaf-list.
    pub fn leaf_list(&mut self, def: LeafListDef) -> &mut Self {
        self.add_child(
            def.name,
            SpecKind::LeafList {
                ty: def.ty,
                min_elements: def.min_elements,
                max_elements: def.max_elements,
                ordered_by_user: def.ordered_by_user,
            },
            def.config,
            def.when,
            def.musts,
        );
        self
    }
}

/// Builder for one module.
pub struct ModuleBuilder<'a> {
    node: NodeBuilder<'a>,
    features: &'a mut BTreeSet<String>,
}

impl<'a> ModuleBuilder<'a> {
    /// Enable a feature.
    pub fn feature(&mut self, name: impl Into<String>) -> &mut Self {
        self.features.insert(name.into());
        self
    }

    /// Add a top-level container.
    pub fn container(
        &mut self,
        def: ContainerDef,
        f: impl FnOnce(&mut NodeBuilder),
    ) -> &mut Self {
        self.node.container(def, f);
        self
    }

    /// Add a top-level list.
    pub fn list(&mut self, def: ListDef, f: impl FnOnce(&mut NodeBuilder)) -> &mut Self {
        self.node.list(def, f);
        self
    }

    /// Add a top-level leaf.
    pub fn leaf(&mut self, def: LeafDef) -> &mut Self {
        self.node.leaf(def);
        self
    }

    /// Add a top-level leaf-list.
    pub fn leaf_list(&mut self, def: LeafListDef) -> &mut Self {
        self.node.leaf_list(def);
        self
    }
}

/// Builder for a whole schema.
pub struct YangSpecBuilder {
    modules: Vec<Module>,
    specs: Vec<NodeSpec>,
    identities: HashMap<String, Identity>,
    errors: Vec<SpecError>,
}

impl Default for YangSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl YangSpecBuilder {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            specs: Vec::new(),
            identities: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Declare an identity, optionally derived from a base.
    pub fn identity(mut self, name: impl Into<String>, base: Option<&str>) -> Self {
        let name = name.into();
        self.identities.insert(
            name.clone(),
            Identity {
                name,
                base: base.map(str::to_string),
            },
        );
        self
    }

    /// Declare a module and populate its top-level statements.
    pub fn module(
        mut self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        revision: &str,
        f: impl FnOnce(&mut ModuleBuilder),
    ) -> Self {
        let name = name.into();
        let namespace = namespace.into();
        if self
            .modules
            .iter()
            .any(|m| m.name == name || m.namespace == namespace)
        {
            self.errors.push(SpecError::DuplicateModule(name.clone()));
        }
        let revision = match Revision::parse(revision) {
            Ok(r) => r,
            Err(e) => {
                self.errors.push(SpecError::BadRevision(e));
                Revision::NONE
            }
        };
        let module_id = ModuleId::new(self.modules.len() as u32);
        let root = SpecId::new(self.specs.len() as u32);
        self.specs.push(NodeSpec {
            id: root,
            module: module_id,
            name: name.clone(),
            kind: SpecKind::Container { presence: false },
            config: true,
            when: None,
            musts: Vec::new(),
            children: Vec::new(),
            child_index: HashMap::new(),
        });
        let mut features = BTreeSet::new();
        {
            let mut builder = ModuleBuilder {
                node: NodeBuilder {
                    specs: &mut self.specs,
                    errors: &mut self.errors,
                    id: root,
                    module: module_id,
                },
                features: &mut features,
            };
            f(&mut builder);
        }
        self.modules.push(Module {
            id: module_id,
            name,
            namespace,
            revision,
            features,
            root,
        });
        self
    }

    /// Validate and produce the immutable schema.
    pub fn build(mut self) -> SpecResult<YangSpec> {
        self.check_structure();
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let by_namespace = self
            .modules
            .iter()
            .map(|m| (m.namespace.clone(), m.id))
            .collect();
        Ok(YangSpec {
            modules: self.modules,
            specs: self.specs,
            identities: self.identities,
            by_namespace,
        })
    }

    fn check_structure(&mut self) {
        let mut errors = Vec::new();
        for spec in &self.specs {
            match &spec.kind {
                SpecKind::List { keys, unique, .. } => {
                    for key in keys {
                        if spec.child(key).is_none() {
                            errors.push(SpecError::UnknownKey {
                                list: spec.name.clone(),
                                key: key.clone(),
                            });
                        }
                    }
                    for tuple in unique {
                        for leaf in tuple {
                            if spec.child(leaf).is_none() {
                                errors.push(SpecError::UnknownUnique {
                                    list: spec.name.clone(),
                                    leaf: leaf.clone(),
                                });
                            }
                        }
                    }
                }
                SpecKind::Leaf { ty, .. } | SpecKind::LeafList { ty, .. } => {
                    Self::check_type(ty, &self.identities, &mut errors);
                }
                SpecKind::Container { .. } => {}
            }
            for must in &spec.musts {
                if let Err(e) = Expr::parse(&must.expr) {
                    errors.push(SpecError::BadExpression {
                        expr: must.expr.clone(),
                        source: e,
                    });
                }
            }
            if let Some(when) = &spec.when {
                if let Err(e) = Expr::parse(when) {
                    errors.push(SpecError::BadExpression {
                        expr: when.clone(),
                        source: e,
                    });
                }
            }
        }
        self.errors.extend(errors);
    }

    fn check_type(
        ty: &TypeSpec,
        identities: &HashMap<String, Identity>,
        errors: &mut Vec<SpecError>,
    ) {
        match ty {
            TypeSpec::IdentityRef { base } => {
                if !identities.contains_key(base) {
                    errors.push(SpecError::UnknownIdentityBase(base.clone()));
                }
            }
            TypeSpec::LeafRef { path } => {
                if let Err(e) = Path::parse(path) {
                    errors.push(SpecError::BadExpression {
                        expr: path.clone(),
                        source: e,
                    });
                }
            }
            TypeSpec::Union(alternatives) => {
                for alt in alternatives {
                    Self::check_type(alt, identities, errors);
                }
            }
            _ => {}
        }
    }
}
