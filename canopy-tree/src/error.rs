//! Tree operation errors.

use canopy_core::NodeId;
use thiserror::Error;

/// Errors from tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The node handle does not refer to a live node of this tree.
    #[error("invalid node handle: {0}")]
    InvalidNode(NodeId),

    /// The operation requires an element node.
    #[error("not an element: {0}")]
    NotAnElement(NodeId),

    /// Moving a node under its own descendant.
    #[error("cannot move {0} under its own subtree")]
    MoveIntoSelf(NodeId),

    /// The root cannot be removed or moved.
    #[error("operation not allowed on the tree root")]
    RootImmovable,

    /// Malformed serialized tree.
    #[error("malformed tree document: {0}")]
    Malformed(String),

    /// JSON de/serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
