//! Plugin lifecycle bus.
//!
//! Plugins participate in every transaction through up to seven
//! lifecycle callbacks. The bus holds them in registration order and
//! drives each phase across all of them, short-circuiting on the first
//! failure. `abort` is the exception: it runs in reverse order, over
//! the plugins that got through `begin`, and never short-circuits.

mod bus;
mod descriptor;
mod error;

pub use bus::PluginBus;
pub use descriptor::{Plugin, PluginResult, TxnView};
pub use error::{PluginError, PluginFailure};

/// Lifecycle phases a plugin can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    Validate,
    Complete,
    Commit,
    CommitDone,
    End,
    Abort,
}

impl Phase {
    /// Phase name for logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Begin => "begin",
            Phase::Validate => "validate",
            Phase::Complete => "complete",
            Phase::Commit => "commit",
            Phase::CommitDone => "commit-done",
            Phase::End => "end",
            Phase::Abort => "abort",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
