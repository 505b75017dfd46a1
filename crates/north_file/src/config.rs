//! Plugin configuration parsed from the init map

use std::path::PathBuf;

use contracts::ConfigMap;
use thiserror::Error;

pub const PATH: &str = "path";
pub const MAX_BATCH: &str = "max_batch";
pub const FLUSH: &str = "flush";

const DEFAULT_PATH: &str = "north_file.jsonl";

#[derive(Debug, Error, PartialEq)]
pub enum FileConfigError {
    #[error("'{key}' must not be empty")]
    Empty { key: &'static str },

    #[error("'{key}' is not a valid {expected}: {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Settings of a [`FilePlugin`](crate::FilePlugin)
#[derive(Debug, Clone, PartialEq)]
pub struct FileConfig {
    /// Output file, opened in append mode
    pub path: PathBuf,
    /// Readings accepted per send, 0 = unlimited
    pub max_batch: usize,
    /// Flush after every send
    pub flush: bool,
}

impl FileConfig {
    pub fn defaults() -> ConfigMap {
        ConfigMap::from([
            (PATH.to_string(), DEFAULT_PATH.to_string()),
            (MAX_BATCH.to_string(), "0".to_string()),
            (FLUSH.to_string(), "true".to_string()),
        ])
    }

    /// Parse, falling back to defaults for absent keys
    pub fn from_map(config: &ConfigMap) -> Result<Self, FileConfigError> {
        let path = config.get(PATH).map(String::as_str).unwrap_or(DEFAULT_PATH);
        if path.trim().is_empty() {
            return Err(FileConfigError::Empty { key: PATH });
        }

        let max_batch = match config.get(MAX_BATCH) {
            Some(raw) => raw.trim().parse().map_err(|_| FileConfigError::Invalid {
                key: MAX_BATCH,
                expected: "count",
                value: raw.clone(),
            })?,
            None => 0,
        };

        let flush = match config.get(FLUSH).map(|v| v.trim().to_ascii_lowercase()) {
            None => true,
            Some(v) if v == "true" || v == "1" => true,
            Some(v) if v == "false" || v == "0" => false,
            Some(v) => {
                return Err(FileConfigError::Invalid {
                    key: FLUSH,
                    expected: "boolean",
                    value: v,
                })
            }
        };

        Ok(Self {
            path: PathBuf::from(path),
            max_batch,
            flush,
        })
    }
}
