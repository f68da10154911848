//! The schema capability consumed by tree operations.
//!
//! Binding, sorting and diffing need a few facts about the YANG schema
//! without this crate depending on the schema registry itself. The
//! registry implements this trait.

use canopy_core::SpecId;

/// What tree operations need to know about a schema.
pub trait Schema {
    /// Resolve a top-level element to its statement.
    fn root_child(&self, namespace: Option<&str>, name: &str) -> Option<SpecId>;

    /// Resolve a child element under a bound parent.
    fn child_of(&self, parent: SpecId, namespace: Option<&str>, name: &str) -> Option<SpecId>;

    /// Key leaf names of a list statement (empty for non-lists).
    fn list_keys(&self, spec: SpecId) -> &[String];

    /// True for leaf-list statements.
    fn is_leaf_list(&self, spec: SpecId) -> bool;

    /// True if the statement is `ordered-by user`.
    fn ordered_by_user(&self, spec: SpecId) -> bool;
}
