//! YANG schema registry.
//!
//! The registry holds the schema facts the validator and the engine
//! consume: modules with revisions and features, the statement tree
//! (containers, lists, leaves, leaf-lists) with type constraints,
//! `must`/`when` expressions, and identities. It implements the
//! `canopy_tree::Schema` capability so trees can be bound, sorted and
//! diffed against it.
//!
//! Schemas are immutable after `build()`; the engine never mutates one
//! mid-flight.

mod builder;
mod error;
mod registry;
mod types;

pub use builder::{ContainerDef, LeafDef, LeafListDef, ListDef, ModuleBuilder, NodeBuilder, YangSpecBuilder};
pub use error::{SpecError, SpecResult};
pub use registry::YangSpec;
pub use types::{Identity, Module, Must, NodeSpec, SpecKind, TypeSpec};
