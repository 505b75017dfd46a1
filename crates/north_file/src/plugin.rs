//! FilePlugin - appends every delivered reading to a JSON-lines file

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};

use contracts::{ConfigMap, PersistedState, Reading};
use plugin_host::NorthPluginApi;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::FileConfig;

/// Progress carried across restarts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Readings written over the plugin's lifetime
    pub count: u64,
    /// Id of the last written reading that carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<u64>,
}

impl FileState {
    fn decode(stored: &PersistedState) -> Option<Self> {
        match serde_json::from_str(stored.as_str()) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "unreadable persisted state, starting fresh");
                None
            }
        }
    }

    fn encode(&self) -> Option<PersistedState> {
        serde_json::to_string(self).ok().map(PersistedState::new)
    }
}

/// Persisting north plugin writing one JSON document per reading
#[derive(Debug)]
pub struct FilePlugin {
    config: FileConfig,
    writer: Option<BufWriter<File>>,
    state: FileState,
}

impl FilePlugin {
    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    fn open(&self) -> io::Result<BufWriter<File>> {
        if let Some(parent) = self.config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)?;
        Ok(BufWriter::new(file))
    }

    fn write_reading(writer: &mut BufWriter<File>, reading: &Reading) -> io::Result<()> {
        serde_json::to_writer(&mut *writer, reading)?;
        writer.write_all(b"\n")
    }
}

impl NorthPluginApi for FilePlugin {
    const PERSISTS_DATA: bool = true;

    fn init(config: ConfigMap) -> Result<Self, String> {
        let config = FileConfig::from_map(&config).map_err(|e| e.to_string())?;
        info!(path = %config.path.display(), max_batch = config.max_batch, "file plugin initialized");

        Ok(Self {
            config,
            writer: None,
            state: FileState::default(),
        })
    }

    fn start(&mut self, stored: Option<PersistedState>) {
        if let Some(state) = stored.as_ref().and_then(FileState::decode) {
            debug!(count = state.count, last_id = ?state.last_id, "resuming");
            self.state = state;
        }

        match self.open() {
            Ok(writer) => self.writer = Some(writer),
            Err(e) => error!(path = %self.config.path.display(), error = %e, "cannot open output file"),
        }
    }

    fn send(&mut self, readings: &[Reading]) -> u32 {
        let Some(writer) = self.writer.as_mut() else {
            warn!("send without an open output file");
            return 0;
        };

        let limit = match self.config.max_batch {
            0 => readings.len(),
            n => n.min(readings.len()),
        };

        let mut written = 0u32;
        for reading in &readings[..limit] {
            if let Err(e) = Self::write_reading(writer, reading) {
                error!(error = %e, written, "write failed");
                break;
            }
            written += 1;
            self.state.count += 1;
            if let Some(id) = reading.id() {
                self.state.last_id = Some(id);
            }
        }

        if self.config.flush {
            if let Err(e) = writer.flush() {
                error!(error = %e, "flush failed");
            }
        }
        written
    }

    fn default_config() -> ConfigMap {
        FileConfig::defaults()
    }

    fn shutdown(mut self) -> Option<PersistedState> {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                error!(error = %e, "flush on shutdown failed");
            }
        }
        info!(count = self.state.count, "file plugin shut down");
        self.state.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_BATCH, PATH};
    use contracts::{Datapoint, DatapointValue};
    use tempfile::TempDir;

    fn reading(asset: &str, id: u64) -> Reading {
        Reading::new(
            asset,
            vec![Datapoint::new("value", DatapointValue::Integer(id as i64))],
        )
        .with_id(id)
    }

    fn plugin(dir: &TempDir, extra: &[(&str, &str)]) -> FilePlugin {
        let mut config = ConfigMap::from([(
            PATH.to_string(),
            dir.path().join("out").join("readings.jsonl").display().to_string(),
        )]);
        for (k, v) in extra {
            config.insert(k.to_string(), v.to_string());
        }
        FilePlugin::init(config).unwrap()
    }

    fn lines(plugin: &FilePlugin) -> Vec<serde_json::Value> {
        fs::read_to_string(&plugin.config().path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&dir, &[]);
        plugin.start(None);

        assert_eq!(plugin.send(&[reading("pump", 1), reading("fan", 2)]), 2);

        let written = lines(&plugin);
        assert_eq!(written.len(), 2);
        assert_eq!(written[0]["asset_code"], "pump");
        assert_eq!(written[1]["reading"][0]["value"], 2);
        assert_eq!(plugin.state(), FileState { count: 2, last_id: Some(2) });
    }

    #[test]
    fn test_max_batch_limits_count() {
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&dir, &[(MAX_BATCH, "2")]);
        plugin.start(None);

        let batch: Vec<_> = (1..=5).map(|i| reading("a", i)).collect();
        assert_eq!(plugin.send(&batch), 2);
        assert_eq!(plugin.send(&batch[2..]), 2);
        assert_eq!(lines(&plugin).len(), 4);
        assert_eq!(plugin.state().last_id, Some(4));
    }

    #[test]
    fn test_send_before_start_delivers_nothing() {
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&dir, &[]);
        assert_eq!(plugin.send(&[reading("a", 1)]), 0);
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();

        let mut first = plugin(&dir, &[]);
        first.start(None);
        first.send(&[reading("a", 7), reading("a", 8)]);
        let stored = first.shutdown().unwrap();

        let mut second = plugin(&dir, &[]);
        second.start(Some(stored));
        second.send(&[reading("a", 9)]);
        assert_eq!(second.state(), FileState { count: 3, last_id: Some(9) });
        assert_eq!(lines(&second).len(), 3);
    }

    #[test]
    fn test_garbled_state_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&dir, &[]);
        plugin.start(Some(PersistedState::new("{not json")));
        assert_eq!(plugin.state(), FileState::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ConfigMap::from([(MAX_BATCH.to_string(), "-1".to_string())]);
        let err = FilePlugin::init(config).unwrap_err();
        assert!(err.contains("max_batch"));
    }
}
