//! Core types shared across the canopy configuration engine.
//!
//! This crate carries the vocabulary the rest of the workspace speaks:
//! arena identifiers, node flags, module revisions, the NETCONF error
//! element, and the clock capability used by the confirmed-commit
//! machinery.

mod clock;
mod error;
mod flags;
mod id;
mod modstate;
mod revision;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorSeverity, ErrorTag, ErrorType, RpcError, RpcErrors};
pub use flags::Flags;
pub use id::{ModuleId, NodeId, SpecId};
pub use modstate::{Modstate, ModstateDelta, ModstateDiff, ModstateStatus, ModuleRev};
pub use revision::{Revision, RevisionError};

/// Client/session identifier. Zero means "no client" (e.g. an unlocked
/// datastore or an engine-internal transaction).
pub type ClientId = u32;
