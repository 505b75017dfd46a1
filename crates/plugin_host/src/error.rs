//! Plugin host error types

use contracts::ContractError;
use thiserror::Error;

use crate::adapter::PluginState;

/// Errors raised while loading, binding or driving a north plugin
#[derive(Debug, Error)]
pub enum PluginError {
    // ===== Resolution Errors (fatal at load time) =====
    /// Shared library could not be opened
    #[error("failed to load plugin library '{path}': {message}")]
    LibraryLoad { path: String, message: String },

    /// Mandatory entry point missing
    #[error("plugin '{plugin}' does not export mandatory symbol '{symbol}'")]
    MissingSymbol {
        plugin: String,
        symbol: &'static str,
    },

    /// Plugin built against another ABI revision
    #[error("plugin '{plugin}' was built for ABI version {found}, host expects {expected}")]
    AbiMismatch {
        plugin: String,
        expected: u32,
        found: u32,
    },

    // ===== Registry Errors =====
    /// Name already taken
    #[error("plugin '{name}' is already registered")]
    Duplicate { name: String },

    /// Unknown plugin name
    #[error("plugin '{name}' not found in registry")]
    NotFound { name: String },

    // ===== Lifecycle Errors =====
    /// `plugin_init` returned a null handle
    #[error("plugin '{plugin}' init returned no handle")]
    InitFailed { plugin: String },

    /// Operation called outside its legal state
    #[error("plugin '{plugin}': '{operation}' is not legal in state {state}")]
    Lifecycle {
        plugin: String,
        operation: &'static str,
        state: PluginState,
    },

    // ===== Marshalling Errors =====
    /// Data could not cross the ABI
    #[error("plugin '{plugin}' marshalling error: {message}")]
    Marshal { plugin: String, message: String },

    /// Contract error
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

impl PluginError {
    pub fn library_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LibraryLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn missing_symbol(plugin: impl Into<String>, symbol: &'static str) -> Self {
        Self::MissingSymbol {
            plugin: plugin.into(),
            symbol,
        }
    }

    pub fn marshal(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Marshal {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Load-time failure: the plugin must not be activated
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::LibraryLoad { .. } | Self::MissingSymbol { .. } | Self::AbiMismatch { .. }
        )
    }

    /// Caller bug: operation outside the lifecycle
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle { .. })
    }
}

/// Plugin host Result type alias
pub type Result<T> = std::result::Result<T, PluginError>;
