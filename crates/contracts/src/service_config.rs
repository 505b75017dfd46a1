//! NorthServiceConfig - Config Loader output
//!
//! Describes one north delivery service: which plugin to load, the
//! configuration handed to it, the delivery policy and where persisted state
//! lives.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::ConfigMap;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete north service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NorthServiceConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Service identity
    #[validate(nested)]
    pub service: ServiceConfig,

    /// Plugin to load
    #[validate(nested)]
    pub plugin: PluginConfig,

    /// Delivery policy
    #[serde(default)]
    #[validate(nested)]
    pub delivery: DeliveryConfig,

    /// Persisted state location
    #[serde(default)]
    pub state: StateConfig,
}

/// Service identity
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// Service name (e.g., "north_omf")
    #[validate(length(min = 1, message = "service name must not be empty"))]
    pub name: String,
}

/// North plugin selection
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PluginConfig {
    /// Plugin name, used as registry key and state key
    #[validate(length(min = 1, message = "plugin name must not be empty"))]
    pub name: String,

    /// Shared library exporting the plugin entry points
    pub library: PathBuf,

    /// Configuration map passed to `plugin_init`
    #[serde(default)]
    pub config: ConfigMap,
}

/// Delivery policy for the north task
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeliveryConfig {
    /// Capacity of the batch queue in front of the plugin
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "queue_capacity must be >= 1"))]
    pub queue_capacity: usize,

    /// Number of times the undelivered tail of a batch is re-sent
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Pause between retries (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Policy when the batch queue is full
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

impl DeliveryConfig {
    /// Pause between retries
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            retry_limit: default_retry_limit(),
            retry_backoff_ms: default_retry_backoff_ms(),
            drop_policy: DropPolicy::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    100
}

fn default_retry_limit() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

/// Backpressure drop policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Drop the incoming batch
    #[default]
    DropNewest,
    /// Block the producer until there is room
    Block,
}

/// Persisted state location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// JSON file holding the plugin state (None = in-memory only)
    #[serde(default)]
    pub path: Option<PathBuf>,
}
