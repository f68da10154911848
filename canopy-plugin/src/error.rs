//! Plugin errors.

use thiserror::Error;

/// Failure reported by a plugin callback.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PluginFailure(pub String);

impl PluginFailure {
    /// Create a failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A failure attributed to a plugin and callback by the bus.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin's callback returned an error.
    #[error("plugin {plugin:?} failed in {context}: {source}")]
    Callback {
        plugin: String,
        context: String,
        #[source]
        source: PluginFailure,
    },

    /// The plugin's context fence changed across a callback, which
    /// indicates the extension corrupted its own state.
    #[error("plugin {plugin:?} tripped its context fence in {context}")]
    FenceTripped { plugin: String, context: String },
}

impl PluginError {
    /// The name of the offending plugin.
    pub fn plugin(&self) -> &str {
        match self {
            PluginError::Callback { plugin, .. } => plugin,
            PluginError::FenceTripped { plugin, .. } => plugin,
        }
    }
}
