//! Module-version upgrade machinery.
//!
//! When a datastore's embedded module-state disagrees with the running
//! schema, stored content must be transformed before it can bind. Two
//! mechanisms exist:
//! - programmatic callbacks registered per namespace ([`UpgradeRegistry`])
//! - the declarative [`Changelog`]: an ordered list of rename / replace /
//!   insert / delete / move steps selected by revision interval.

mod changelog;
mod error;
mod modstate;
mod ops;
mod registry;

pub use changelog::{Changelog, ChangelogEntry, Step, StepOp};
pub use error::{UpgradeError, UpgradeResult};
pub use modstate::modstate_diff;
pub use registry::{ModuleUpgradeFn, UpgradeRegistry};
