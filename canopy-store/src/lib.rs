//! Datastore persistence.
//!
//! A store is one directory holding the named datastores (`candidate`,
//! `running`, `startup`, `failsafe`, `tmp`, plus rollback snapshots),
//! one JSON file each, every file carrying an optional embedded
//! module-state record. The store also owns the per-datastore advisory
//! locks and dirty bits; both are in-memory state of the single
//! backend process, only the files persist.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::DatastoreStore;

/// The canonical datastore names.
pub const CANDIDATE: &str = "candidate";
pub const RUNNING: &str = "running";
pub const STARTUP: &str = "startup";
pub const FAILSAFE: &str = "failsafe";
pub const TMP: &str = "tmp";
