//! Engine errors.
//!
//! The tagged variants distinguish what the layered callers need to
//! know: a validation failure is recoverable by the client, a lock
//! conflict maps to `in-use`, everything else surfaces as
//! `operation-failed`, and `Fatal` means the process cannot continue.

use canopy_core::{ClientId, RpcErrors};
use canopy_plugin::PluginError;
use canopy_store::StoreError;
use canopy_tree::TreeError;
use canopy_upgrade::UpgradeError;
use thiserror::Error;

/// Errors from the transaction engine.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The candidate is semantically invalid; carries the accumulated
    /// error elements.
    #[error("validation failed: {0}")]
    Validation(RpcErrors),

    /// A datastore is locked by another session.
    #[error("datastore {db} is locked by session {holder}")]
    LockHeld { db: String, holder: ClientId },

    /// An RPC parameter is unusable (e.g. a zero confirm-timeout).
    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    /// A plugin callback failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Datastore persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Tree manipulation failed.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Module upgrade failed.
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    /// The engine cannot continue.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Result type for engine operations.
pub type TxResult<T> = Result<T, TransactionError>;
