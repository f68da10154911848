//! Store errors.

use canopy_core::ClientId;
use thiserror::Error;

/// Errors from datastore operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named datastore has no file.
    #[error("datastore not found: {0}")]
    NotFound(String),

    /// The datastore is locked by another client.
    #[error("datastore {db} locked by session {holder}")]
    LockHeld { db: String, holder: ClientId },

    /// Unlocking a datastore the client does not hold.
    #[error("datastore {db} not locked by session {client}")]
    NotHolder { db: String, client: ClientId },

    /// Filesystem failure.
    #[error("datastore i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed datastore file.
    #[error(transparent)]
    Tree(#[from] canopy_tree::TreeError),

    /// Malformed datastore file envelope.
    #[error("malformed datastore file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Result type for datastore operations.
pub type StoreResult<T> = Result<T, StoreError>;
