//! Generic validation of configuration trees against a YANG schema.
//!
//! Two entry points mirror the two shapes the engine needs:
//! [`Validator::validate_all_top`] walks a whole tree, and
//! [`Validator::validate_add`] runs the same checks on one subtree
//! (incremental edits, and the added-vector pass of a commit).
//!
//! Default fill-in is a separate, earlier pass: [`Validator::fill_defaults`]
//! runs before validation so a leaf with a default never trips the
//! mandatory check.

mod checker;
mod defaults;
mod value;

pub use checker::Validator;
pub use value::check_value;
