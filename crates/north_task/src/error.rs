//! North task error types

use plugin_host::PluginError;
use thiserror::Error;

/// North task errors
#[derive(Debug, Error)]
pub enum TaskError {
    /// Plugin failed to initialise or start, or misbehaved
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Persisted state could not be loaded or saved
    #[error("state error: {0}")]
    State(#[from] contracts::ContractError),

    /// Queue closed, the worker is gone
    #[error("delivery queue for '{plugin}' is closed")]
    Closed { plugin: String },

    /// Worker thread panicked or was cancelled
    #[error("delivery worker for '{plugin}' failed: {message}")]
    Worker { plugin: String, message: String },
}

impl TaskError {
    /// Create a worker failure error
    pub fn worker(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Worker {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

/// North task Result type alias
pub type Result<T> = std::result::Result<T, TaskError>;
