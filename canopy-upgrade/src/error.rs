//! Upgrade errors.

use canopy_tree::{PathError, TreeError};
use thiserror::Error;

/// Errors from upgrade machinery.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// A step lacks a field its operation requires.
    #[error("changelog {op} step requires {field:?}")]
    MissingField { op: &'static str, field: &'static str },

    /// A `where`/`when`/`tag`/`dst` expression failed to parse.
    #[error("bad changelog expression {expr:?}: {source}")]
    BadExpression {
        expr: String,
        #[source]
        source: PathError,
    },

    /// A rename tag evaluated to nothing or an empty string.
    #[error("rename tag {0:?} yields no name")]
    EmptyRename(String),

    /// A move destination matched nothing.
    #[error("move destination {0:?} matches nothing")]
    NoDestination(String),

    /// An upgrade callback failed.
    #[error("upgrade callback for {namespace}: {message}")]
    Callback { namespace: String, message: String },

    /// Tree manipulation failed.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Changelog file i/o.
    #[error("changelog i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed changelog file.
    #[error("malformed changelog: {0}")]
    Format(#[from] serde_json::Error),
}

/// Result type for upgrade machinery.
pub type UpgradeResult<T> = Result<T, UpgradeError>;
