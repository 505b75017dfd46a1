//! State stores - where persisted plugin state lives between runs

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use contracts::{ContractError, PersistedState, StateStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// On-disk document written by [`FileStateStore`]
#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    plugin: String,
    state: PersistedState,
    saved_at: DateTime<Utc>,
}

/// JSON file holding the state of one plugin
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl Into<String>) -> ContractError {
        ContractError::state_store(self.path.display().to_string(), message)
    }
}

impl StateStore for FileStateStore {
    fn name(&self) -> &str {
        "file"
    }

    #[instrument(name = "file_state_store_load", skip(self), fields(path = %self.path.display()))]
    fn load(&self, plugin: &str) -> Result<Option<PersistedState>, ContractError> {
        if !self.path.exists() {
            debug!(plugin, "no persisted state");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| self.error(format!("failed to read: {e}")))?;
        let document: StateDocument = serde_json::from_str(&content)
            .map_err(|e| self.error(format!("invalid state document: {e}")))?;

        if document.plugin != plugin {
            warn!(
                plugin,
                stored_for = %document.plugin,
                "persisted state belongs to another plugin, ignored"
            );
            return Ok(None);
        }

        debug!(plugin, saved_at = %document.saved_at, "persisted state loaded");
        Ok(Some(document.state))
    }

    #[instrument(name = "file_state_store_save", skip(self, state), fields(path = %self.path.display()))]
    fn save(&mut self, plugin: &str, state: &PersistedState) -> Result<(), ContractError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| self.error(format!("failed to create directory: {e}")))?;
        }

        let document = StateDocument {
            plugin: plugin.to_string(),
            state: state.clone(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| self.error(format!("failed to encode: {e}")))?;

        // Replace atomically via rename
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| self.error(format!("failed to write: {e}")))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.error(format!("failed to replace: {e}")))?;

        debug!(plugin, "persisted state saved");
        Ok(())
    }
}

/// In-memory store; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    states: Arc<Mutex<HashMap<String, PersistedState>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `plugin`
    pub fn get(&self, plugin: &str) -> Option<PersistedState> {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(plugin).cloned())
    }
}

impl StateStore for MemoryStateStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, plugin: &str) -> Result<Option<PersistedState>, ContractError> {
        let states = self
            .states
            .lock()
            .map_err(|_| ContractError::state_store("memory", "lock poisoned"))?;
        Ok(states.get(plugin).cloned())
    }

    fn save(&mut self, plugin: &str, state: &PersistedState) -> Result<(), ContractError> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| ContractError::state_store("memory", "lock poisoned"))?;
        states.insert(plugin.to_string(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path().join("state").join("north.json"));

        assert_eq!(store.load("file").unwrap(), None);

        store.save("file", &PersistedState::new(r#"{"count":3}"#)).unwrap();
        let loaded = store.load("file").unwrap().unwrap();
        assert_eq!(loaded.as_str(), r#"{"count":3}"#);

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["plugin"], "file");
        assert!(value["saved_at"].is_string());
    }

    #[test]
    fn test_file_store_other_plugin_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path().join("north.json"));
        store.save("omf", &PersistedState::new("x")).unwrap();

        assert_eq!(store.load("file").unwrap(), None);
    }

    #[test]
    fn test_file_store_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("north.json");
        fs::write(&path, "not json").unwrap();

        let err = FileStateStore::new(&path).load("file").unwrap_err();
        assert!(matches!(err, ContractError::StateStore { .. }));
    }

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryStateStore::new();
        let mut writer = store.clone();
        writer.save("p", &PersistedState::new("42")).unwrap();

        assert_eq!(store.get("p"), Some(PersistedState::new("42")));
        assert_eq!(store.load("q").unwrap(), None);
    }
}
