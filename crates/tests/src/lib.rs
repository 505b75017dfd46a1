//! # Integration Tests
//!
//! Integration and end-to-end tests.
//!
//! Covers:
//! - Configuration contract round trips
//! - Reference plugin driven through the adapter
//! - Reference plugin loaded from its built shared library
//! - Ingest bridge -> channel -> north task -> plugin, with state carried
//!   across restarts

#[cfg(test)]
mod support {
    use std::path::Path;
    use std::sync::Arc;

    use contracts::{ConfigMap, Datapoint, DatapointValue, Reading, ReadingSet};
    use plugin_host::{NorthPlugin, PluginRegistry, StaticModule};

    /// Registry holding the reference file plugin
    pub fn file_plugin() -> NorthPlugin {
        let mut registry = PluginRegistry::new();
        let table = registry
            .register(Arc::new(StaticModule::from_plugin::<north_file::FilePlugin>(
                "file",
            )))
            .unwrap();
        NorthPlugin::new(table)
    }

    pub fn file_config(path: &Path, max_batch: usize) -> ConfigMap {
        ConfigMap::from([
            ("path".to_string(), path.display().to_string()),
            ("max_batch".to_string(), max_batch.to_string()),
        ])
    }

    pub fn batch(first_id: u64, n: u64) -> ReadingSet {
        ReadingSet::new(
            (first_id..first_id + n)
                .map(|id| {
                    Reading::new(
                        "pump",
                        vec![Datapoint::new("flow", DatapointValue::Float(id as f64))],
                    )
                    .with_id(id)
                })
                .collect(),
        )
    }

    pub fn lines(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::DropPolicy;

    #[test]
    fn test_config_round_trip_between_formats() {
        let toml = r#"
[service]
name = "north_file"

[plugin]
name = "file"
library = "libnorth_file.so"

[plugin.config]
path = "out.jsonl"
max_batch = "10"

[delivery]
drop_policy = "block"
"#;
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let again = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();

        assert_eq!(again.plugin.config, config.plugin.config);
        assert_eq!(again.delivery.drop_policy, DropPolicy::Block);
        assert_eq!(again.version, contracts::ConfigVersion::V1);
    }
}

#[cfg(test)]
mod plugin_tests {
    use super::support::*;
    use contracts::PersistedState;
    use plugin_host::PluginState;
    use tempfile::TempDir;

    #[test]
    fn test_reference_plugin_entry_points() {
        let plugin = file_plugin();
        let table = plugin.table();

        assert!(table.persists_data());
        assert_eq!(table.abi_version(), plugin_host::NORTH_ABI_VERSION);
        let slots: Vec<_> = table
            .bound_slots()
            .into_iter()
            .filter(|(_, bound)| *bound)
            .map(|(slot, _)| slot)
            .collect();
        assert_eq!(
            slots,
            vec!["init", "start_data", "send", "config", "shutdown_save_data"]
        );

        let defaults = plugin.config().unwrap();
        assert_eq!(defaults["path"], "north_file.jsonl");
    }

    #[test]
    fn test_lifecycle_with_state_round_trip() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("readings.jsonl");

        let mut plugin = file_plugin();
        plugin.init(&file_config(&out, 0)).unwrap();
        plugin.start_data(&PersistedState::default()).unwrap();

        let readings = batch(1, 3);
        assert_eq!(plugin.send(&readings).unwrap(), 3);
        // Borrowed, not consumed
        assert_eq!(readings.len(), 3);

        let state = plugin.shutdown_save_data().unwrap();
        assert_eq!(plugin.state(), PluginState::Shutdown);
        let value: serde_json::Value = serde_json::from_str(state.as_str()).unwrap();
        assert_eq!(value["count"], 3);
        assert_eq!(value["last_id"], 3);

        let mut resumed = file_plugin();
        resumed.init(&file_config(&out, 0)).unwrap();
        resumed.start_data(&state).unwrap();
        assert_eq!(resumed.send(&batch(4, 2)).unwrap(), 2);
        let state = resumed.shutdown_save_data().unwrap();

        let value: serde_json::Value = serde_json::from_str(state.as_str()).unwrap();
        assert_eq!(value["count"], 5);
        assert_eq!(lines(&out), 5);
    }

    #[test]
    fn test_plain_calls_on_persisting_plugin() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("plain.jsonl");

        let mut plugin = file_plugin();
        plugin.init(&file_config(&out, 0)).unwrap();
        plugin.start().unwrap();
        assert_eq!(plugin.send(&batch(1, 1)).unwrap(), 1);
        plugin.shutdown().unwrap();

        assert!(plugin.send(&batch(2, 1)).unwrap_err().is_lifecycle());
        assert_eq!(lines(&out), 1);
    }

    #[test]
    fn test_bad_config_fails_init() {
        let mut plugin = file_plugin();
        let config = contracts::ConfigMap::from([("flush".to_string(), "maybe".to_string())]);

        assert!(plugin.init(&config).is_err());
        assert_eq!(plugin.state(), PluginState::Unloaded);
    }
}

#[cfg(test)]
mod shared_library_tests {
    use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
    use std::path::PathBuf;
    use std::time::SystemTime;

    use super::support::*;
    use contracts::PersistedState;
    use plugin_host::{NorthPlugin, PluginRegistry, PluginState};
    use tempfile::TempDir;

    /// Newest `north_file` cdylib next to the test binary
    fn built_library() -> Option<PathBuf> {
        let deps = std::env::current_exe().ok()?.parent()?.to_path_buf();
        let profile = deps.parent()?.to_path_buf();
        let stem = format!("{DLL_PREFIX}north_file");

        [profile, deps]
            .iter()
            .filter_map(|dir| std::fs::read_dir(dir).ok())
            .flatten()
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.starts_with(&stem) && name.ends_with(DLL_SUFFIX)
            })
            .max_by_key(|entry| {
                entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            })
            .map(|entry| entry.path())
    }

    #[test]
    fn test_load_reference_plugin_library() {
        let Some(path) = built_library() else {
            eprintln!("north_file shared library not built, skipping");
            return;
        };

        let mut registry = PluginRegistry::new();
        let table = registry.load("file", &path).unwrap();
        assert_eq!(registry.names(), vec!["file"]);
        assert_eq!(table.abi_version(), plugin_host::NORTH_ABI_VERSION);
        assert!(table.persists_data());
        let bound: Vec<_> = table
            .bound_slots()
            .into_iter()
            .filter(|(_, bound)| *bound)
            .map(|(slot, _)| slot)
            .collect();
        assert_eq!(
            bound,
            vec!["init", "start_data", "send", "config", "shutdown_save_data"]
        );

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("loaded.jsonl");
        let mut plugin = NorthPlugin::new(table);
        assert_eq!(plugin.config().unwrap()["path"], "north_file.jsonl");

        plugin.init(&file_config(&out, 0)).unwrap();
        plugin.start_data(&PersistedState::new(r#"{"count":7}"#)).unwrap();
        assert_eq!(plugin.send(&batch(3, 1)).unwrap(), 1);

        let state = plugin.shutdown_save_data().unwrap();
        assert_eq!(plugin.state(), PluginState::Shutdown);
        let value: serde_json::Value = serde_json::from_str(state.as_str()).unwrap();
        assert_eq!(value, serde_json::json!({"count": 8, "last_id": 3}));
        assert_eq!(lines(&out), 1);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;

    use super::support::*;
    use contracts::{DeliveryConfig, StateStore};
    use ingest_bridge::{FilterIngestModule, ForeignObject, IngestBridge, IngestChannel};
    use north_task::{FileStateStore, NorthTask};
    use serde_json::json;
    use tempfile::TempDir;

    fn delivery() -> DeliveryConfig {
        DeliveryConfig {
            queue_capacity: 8,
            retry_limit: 3,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    /// Foreign filter batches -> bridge -> channel -> north task -> file
    #[tokio::test]
    async fn test_ingest_to_north_delivery() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("e2e.jsonl");
        let state_path = dir.path().join("state.json");

        let task = NorthTask::start(
            file_plugin(),
            file_config(&out, 0),
            &delivery(),
            Box::new(FileStateStore::new(&state_path)),
        )
        .await
        .unwrap();

        let bridge = IngestBridge::new("e2e");
        let channel = IngestChannel::bounded("e2e", 16, bridge.metrics());
        let module = FilterIngestModule::new(bridge);
        let rx = channel.receiver();

        let producer = std::thread::spawn(move || {
            let batches = [
                json!([
                    {"asset_code": "pump", "reading": {"flow": 1.5}},
                    {"asset_code": "pump", "reading": {"flow": 1.7}},
                ]),
                json!("not a list"),
                json!([{"asset_code": "fan", "reading": {"rpm": 900}}]),
            ];
            for batch in batches {
                let args = [
                    ForeignObject::callback(channel.callback()),
                    ForeignObject::context(channel.context()),
                    ForeignObject::from(batch),
                ];
                module.filter_ingest_callback(&args).unwrap();
            }
            channel.close();
            module.bridge().metrics().snapshot()
        });

        while let Ok(readings) = rx.recv().await {
            assert!(task.submit(readings).await.unwrap());
        }
        let ingest = producer.join().unwrap();
        assert_eq!(ingest.batches_accepted, 2);
        assert_eq!(ingest.batches_rejected, 1);

        let report = task.shutdown().await.unwrap();
        assert_eq!(report.readings_sent, 3);
        assert_eq!(report.readings_unsent, 0);
        assert!(report.state_saved);
        assert_eq!(lines(&out), 3);

        let stored = FileStateStore::new(&state_path).load("file").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(stored.as_str()).unwrap();
        assert_eq!(value["count"], 3);
    }

    /// Partial sends are retried, state resumes on the next run
    #[tokio::test]
    async fn test_retry_and_resume_across_runs() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("retry.jsonl");
        let state_path = dir.path().join("state.json");

        for run in 0..2u64 {
            let task = NorthTask::start(
                file_plugin(),
                file_config(&out, 2),
                &delivery(),
                Box::new(FileStateStore::new(&state_path)),
            )
            .await
            .unwrap();

            assert!(task.submit(batch(run * 5 + 1, 5)).await.unwrap());
            let report = task.shutdown().await.unwrap();

            assert_eq!(report.readings_sent, 5);
            assert_eq!(report.retries, 2);
            assert!(report.state_saved);
        }

        let stored = FileStateStore::new(&state_path).load("file").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(stored.as_str()).unwrap();
        assert_eq!(value["count"], 10);
        assert_eq!(value["last_id"], 10);
        assert_eq!(lines(&out), 10);
    }

    #[tokio::test]
    async fn test_bad_plugin_config_fails_task_start() {
        let store = Box::new(north_task::MemoryStateStore::new());
        let config = contracts::ConfigMap::from([("max_batch".to_string(), "x".to_string())]);

        let result = NorthTask::start(file_plugin(), config, &delivery(), store).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_channel_metrics_shared_with_bridge() {
        let bridge = IngestBridge::new("shared");
        let metrics = bridge.metrics();
        let channel = IngestChannel::bounded("shared", 1, Arc::clone(&metrics));
        let module = FilterIngestModule::new(bridge);

        for _ in 0..2 {
            let args = [
                ForeignObject::callback(channel.callback()),
                ForeignObject::context(channel.context()),
                ForeignObject::from(json!([{"asset_code": "a", "reading": {"x": 1}}])),
            ];
            module.filter_ingest_callback(&args).unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_accepted, 2);
        assert_eq!(snapshot.batches_dropped, 1);
    }
}
