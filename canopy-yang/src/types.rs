//! Schema definition types.

use std::collections::{BTreeSet, HashMap};

use canopy_core::{ModuleId, Revision, SpecId};

/// A YANG module known to the schema.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module handle.
    pub id: ModuleId,
    /// Module name.
    pub name: String,
    /// Namespace URI.
    pub namespace: String,
    /// Current revision.
    pub revision: Revision,
    /// Enabled feature names.
    pub features: BTreeSet<String>,
    /// Synthetic root statement holding the module's top-level children.
    pub root: SpecId,
}

/// A YANG identity.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Identity name.
    pub name: String,
    /// Base identity, if derived.
    pub base: Option<String>,
}

/// Built-in type constraint of a leaf or leaf-list.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    /// Integer with inclusive bounds; covers int8..uint64 and any
    /// range restriction of them.
    Integer { min: i128, max: i128 },
    /// decimal64 with fixed fraction digits and optional range.
    Decimal64 {
        fraction_digits: u8,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Boolean: "true" or "false".
    Boolean,
    /// Presence-only leaf with no value.
    Empty,
    /// String with optional length bounds and patterns (all must match).
    Str {
        min_len: Option<u64>,
        max_len: Option<u64>,
        patterns: Vec<String>,
    },
    /// Enumeration of allowed names.
    Enumeration(Vec<String>),
    /// Space-separated set drawn from the allowed bit names.
    Bits(Vec<String>),
    /// Identity derived from the named base.
    IdentityRef { base: String },
    /// Reference to a leaf selected by path; the value must match an
    /// existing instance.
    LeafRef { path: String },
    /// First matching alternative wins.
    Union(Vec<TypeSpec>),
}

impl TypeSpec {
    pub fn int8() -> Self {
        TypeSpec::Integer { min: i8::MIN as i128, max: i8::MAX as i128 }
    }

    pub fn int16() -> Self {
        TypeSpec::Integer { min: i16::MIN as i128, max: i16::MAX as i128 }
    }

    pub fn int32() -> Self {
        TypeSpec::Integer { min: i32::MIN as i128, max: i32::MAX as i128 }
    }

    pub fn int64() -> Self {
        TypeSpec::Integer { min: i64::MIN as i128, max: i64::MAX as i128 }
    }

    pub fn uint8() -> Self {
        TypeSpec::Integer { min: 0, max: u8::MAX as i128 }
    }

    pub fn uint16() -> Self {
        TypeSpec::Integer { min: 0, max: u16::MAX as i128 }
    }

    pub fn uint32() -> Self {
        TypeSpec::Integer { min: 0, max: u32::MAX as i128 }
    }

    pub fn uint64() -> Self {
        TypeSpec::Integer { min: 0, max: u64::MAX as i128 }
    }

    /// Restrict an integer type to a subrange.
    pub fn with_range(self, min: i128, max: i128) -> Self {
        match self {
            TypeSpec::Integer { .. } => TypeSpec::Integer { min, max },
            other => other,
        }
    }

    /// Unconstrained string.
    pub fn string() -> Self {
        TypeSpec::Str {
            min_len: None,
            max_len: None,
            patterns: Vec::new(),
        }
    }

    /// Add a length bound to a string type.
    pub fn with_length(self, min_len: u64, max_len: u64) -> Self {
        match self {
            TypeSpec::Str { patterns, .. } => TypeSpec::Str {
                min_len: Some(min_len),
                max_len: Some(max_len),
                patterns,
            },
            other => other,
        }
    }

    /// Add a pattern to a string type.
    pub fn with_pattern(self, pattern: impl Into<String>) -> Self {
        match self {
            TypeSpec::Str {
                min_len,
                max_len,
                mut patterns,
            } => {
                patterns.push(pattern.into());
                TypeSpec::Str {
                    min_len,
                    max_len,
                    patterns,
                }
            }
            other => other,
        }
    }

    pub fn enumeration(names: &[&str]) -> Self {
        TypeSpec::Enumeration(names.iter().map(|s| s.to_string()).collect())
    }

    pub fn bits(names: &[&str]) -> Self {
        TypeSpec::Bits(names.iter().map(|s| s.to_string()).collect())
    }

    pub fn identityref(base: impl Into<String>) -> Self {
        TypeSpec::IdentityRef { base: base.into() }
    }

    pub fn leafref(path: impl Into<String>) -> Self {
        TypeSpec::LeafRef { path: path.into() }
    }

    pub fn union(alternatives: Vec<TypeSpec>) -> Self {
        TypeSpec::Union(alternatives)
    }

    pub fn decimal64(fraction_digits: u8) -> Self {
        TypeSpec::Decimal64 {
            fraction_digits,
            min: None,
            max: None,
        }
    }
}

/// A `must` constraint with its optional error annotations.
#[derive(Debug, Clone)]
pub struct Must {
    /// The boolean expression, evaluated with the constrained node as
    /// context.
    pub expr: String,
    /// Message reported on violation.
    pub error_message: Option<String>,
    /// Application tag reported on violation.
    pub error_app_tag: Option<String>,
}

impl Must {
    /// A bare must expression.
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            error_message: None,
            error_app_tag: None,
        }
    }

    /// Attach an error message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Attach an application tag.
    pub fn with_app_tag(mut self, app_tag: impl Into<String>) -> Self {
        self.error_app_tag = Some(app_tag.into());
        self
    }
}

/// Statement kind of a schema node.
#[derive(Debug, Clone)]
pub enum SpecKind {
    /// Container; `presence` containers carry meaning when empty.
    Container { presence: bool },
    /// Keyed list.
    List {
        keys: Vec<String>,
        min_elements: u32,
        max_elements: Option<u32>,
        unique: Vec<Vec<String>>,
        ordered_by_user: bool,
    },
    /// Leaf.
    Leaf {
        ty: TypeSpec,
        default: Option<String>,
        mandatory: bool,
    },
    /// Leaf-list.
    LeafList {
        ty: TypeSpec,
        min_elements: u32,
        max_elements: Option<u32>,
        ordered_by_user: bool,
    },
}

/// One statement of the schema tree.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Statement handle.
    pub id: SpecId,
    /// Owning module.
    pub module: ModuleId,
    /// Statement name.
    pub name: String,
    /// Statement kind and kind-specific constraints.
    pub kind: SpecKind,
    /// False for state (read-only) data.
    pub config: bool,
    /// Conditional presence guard.
    pub when: Option<String>,
    /// Must constraints.
    pub musts: Vec<Must>,
    /// Child statements, in declaration order.
    pub children: Vec<SpecId>,
    pub(crate) child_index: HashMap<String, SpecId>,
}

impl NodeSpec {
    /// Look up a child statement by name.
    pub fn child(&self, name: &str) -> Option<SpecId> {
        self.child_index.get(name).copied()
    }

    /// True for list statements.
    pub fn is_list(&self) -> bool {
        matches!(self.kind, SpecKind::List { .. })
    }

    /// True for leaf statements.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, SpecKind::Leaf { .. })
    }

    /// True for leaf-list statements.
    pub fn is_leaf_list(&self) -> bool {
        matches!(self.kind, SpecKind::LeafList { .. })
    }

    /// Key leaf names for lists, empty otherwise.
    pub fn keys(&self) -> &[String] {
        match &self.kind {
            SpecKind::List { keys, .. } => keys,
            _ => &[],
        }
    }

    /// The value type for leaves and leaf-lists.
    pub fn value_type(&self) -> Option<&TypeSpec> {
        match &self.kind {
            SpecKind::Leaf { ty, .. } => Some(ty),
            SpecKind::LeafList { ty, .. } => Some(ty),
            _ => None,
        }
    }
}
