//! Schema construction errors.

use canopy_tree::PathError;
use thiserror::Error;

/// Errors raised while building a schema.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Two modules share a name or namespace.
    #[error("duplicate module: {0}")]
    DuplicateModule(String),

    /// Two siblings share a name.
    #[error("duplicate child {name:?} under {parent:?}")]
    DuplicateChild { parent: String, name: String },

    /// A list key names no child leaf.
    #[error("list {list:?} declares unknown key {key:?}")]
    UnknownKey { list: String, key: String },

    /// A `unique` tuple names no child leaf.
    #[error("list {list:?} declares unknown unique leaf {leaf:?}")]
    UnknownUnique { list: String, leaf: String },

    /// An identityref base names no identity.
    #[error("unknown identity base: {0}")]
    UnknownIdentityBase(String),

    /// A `must`/`when` expression or leafref path failed to parse.
    #[error("bad expression {expr:?}: {source}")]
    BadExpression {
        expr: String,
        #[source]
        source: PathError,
    },

    /// A malformed revision date.
    #[error(transparent)]
    BadRevision(#[from] canopy_core::RevisionError),
}

/// Result type for schema construction.
pub type SpecResult<T> = Result<T, SpecError>;
