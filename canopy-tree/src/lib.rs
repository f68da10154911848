//! Canopy configuration tree.
//!
//! This crate provides the canonical in-memory representation of
//! configuration data and the operations the transaction engine needs
//! from it:
//! - An arena-allocated tree of element/attribute/body nodes
//! - Schema binding and canonical sorting
//! - A small, stateless path/expression language (the stand-in for
//!   XPath used by `must`/`when` guards and the changelog engine)
//! - JSON serialization with a canonical round-trip
//! - The transaction diff and its flag-marking pass

mod diff;
mod error;
mod json;
mod path;
mod schema;
mod tree;

pub use diff::{diff, mark_transaction_flags, node_identity, Diff};
pub use error::{TreeError, TreeResult};
pub use json::NodeRepr;
pub use path::{CmpOp, Expr, Operand, Path, PathError, Step, ValueExpr};
pub use schema::Schema;
pub use tree::{ConfigTree, NodeKind};
