//! # North File
//!
//! Reference north plugin. Every delivered reading is appended to a
//! JSON-lines file; the running count and last reading id are handed back
//! as persisted state on shutdown.
//!
//! Configuration keys:
//! - `path`: output file (default `north_file.jsonl`)
//! - `max_batch`: readings accepted per send, `0` for no limit
//! - `flush`: flush after every send (default `true`)
//!
//! Built as a `cdylib`, the crate exports the north plugin entry points and
//! can be loaded with `PluginRegistry::load`.

mod config;
mod plugin;

pub use config::{FileConfig, FileConfigError};
pub use plugin::{FilePlugin, FileState};

plugin_host::export_north_plugin!(FilePlugin, persist_data);
