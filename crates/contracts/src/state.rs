//! Persisted plugin state and the store that carries it across restarts

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Configuration map handed to `plugin_init`
pub type ConfigMap = std::collections::HashMap<String, String>;

/// Opaque state produced by `shutdownSaveData` and consumed by `startData`
///
/// The schema belongs to the plugin; the host only threads the string through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedState(String);

impl PersistedState {
    pub fn new(state: impl Into<String>) -> Self {
        Self(state.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for PersistedState {
    fn from(state: String) -> Self {
        Self(state)
    }
}

impl std::fmt::Display for PersistedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable storage for persisted plugin state
///
/// Implementations are used from the delivery worker thread, one plugin per
/// store.
pub trait StateStore: Send {
    /// Store name (used for logging)
    fn name(&self) -> &str;

    /// Load the last saved state for `plugin`, if any
    ///
    /// # Errors
    /// Returns read/parse error (should include context)
    fn load(&self, plugin: &str) -> Result<Option<PersistedState>, ContractError>;

    /// Save state for `plugin`, replacing what was stored before
    fn save(&mut self, plugin: &str, state: &PersistedState) -> Result<(), ContractError>;
}
