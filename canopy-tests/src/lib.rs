//! Test support for the canopy integration scenarios.
//!
//! Provides an engine fixture over a temporary store directory, the
//! shared example schema, and a recording plugin for lifecycle
//! assertions.

mod fixture;
mod recording;

pub mod prelude {
    pub use crate::fixture::{sample_spec, Fixture, FixtureBuilder};
    pub use crate::recording::{Recording, Trace};
    pub use canopy_core::{ErrorTag, ManualClock, Revision};
    pub use canopy_engine::{ConfirmParams, ConfirmPhase, EditOp, RpcReply};
    pub use canopy_store::{CANDIDATE, FAILSAFE, RUNNING, STARTUP, TMP};
    pub use canopy_tree::ConfigTree;
}
