//! Engine configuration options.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options the engine consumes. Loaded by the surrounding process;
/// the engine never reads configuration files itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Embed module-state in saved datastores and compare it on load.
    pub modstate: bool,
    /// Load the startup datastore unbound and run upgrade callbacks
    /// before binding to the current schema.
    pub upgrade_checkold: bool,
    /// Reject state (non-config) data found in the startup datastore.
    pub validate_state: bool,
    /// Declarative changelog to register as a module upgrade callback.
    pub changelog_file: Option<PathBuf>,
    /// Enable the confirmed-commit feature.
    pub confirmed_commit: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            modstate: true,
            upgrade_checkold: true,
            validate_state: true,
            changelog_file: None,
            confirmed_commit: true,
        }
    }
}
