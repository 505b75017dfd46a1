//! Pipeline orchestrator - coordinates all components.
//!
//! A blocking producer plays the foreign filter stage: every input batch is
//! pushed through `filter_ingest_callback` into the ingest channel. The
//! async side drains the channel into the north task, which owns the plugin.

use std::future::Future;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{NorthServiceConfig, StateConfig, StateStore};
use ingest_bridge::{FilterIngestModule, ForeignObject, IngestBridge, IngestChannel};
use north_task::{FileStateStore, MemoryStateStore, NorthTask};
use plugin_host::{NorthPlugin, PluginRegistry};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The north service configuration
    pub service: NorthServiceConfig,

    /// Foreign batches to ingest
    pub batches: Vec<Value>,

    /// Ingest queue capacity (batches)
    pub ingest_buffer: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline until the input is exhausted or `stop` resolves
    ///
    /// Either way the plugin is shut down and its state saved.
    pub async fn run<F>(self, stop: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let PipelineConfig {
            service,
            batches,
            ingest_buffer,
            metrics_port,
        } = self.config;

        if let Some(port) = metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Resolve plugin entry points
        let mut registry = PluginRegistry::new();
        let table = registry
            .load(&service.plugin.name, &service.plugin.library)
            .with_context(|| {
                format!(
                    "Failed to load plugin library {}",
                    service.plugin.library.display()
                )
            })?;

        info!(
            plugin = %table.name(),
            abi_version = table.abi_version(),
            persists_data = table.persists_data(),
            "Plugin resolved"
        );

        // Start the north task
        let task = NorthTask::start(
            NorthPlugin::new(table),
            service.plugin.config.clone(),
            &service.delivery,
            state_store(&service.state),
        )
        .await
        .context("Failed to start north task")?;

        // Wire the ingest side
        let bridge = IngestBridge::new(format!("{}.ingest", service.service.name));
        let ingest_metrics = bridge.metrics();
        let channel = IngestChannel::bounded(
            &service.service.name,
            ingest_buffer,
            ingest_metrics.clone(),
        );
        let rx = channel.receiver();
        let module = FilterIngestModule::new(bridge);

        info!(batches = batches.len(), "Starting ingestion");
        let producer = tokio::task::spawn_blocking(move || produce(&module, &channel, batches));

        let mut stats = PipelineStats::default();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    warn!("Stop requested, closing ingest queue");
                    rx.close();
                    break;
                }
                received = rx.recv() => {
                    let Ok(readings) = received else { break };
                    stats.batches_received += 1;
                    stats.readings_received += readings.len() as u64;

                    if task.submit(readings).await.context("North task rejected batch")? {
                        stats.batches_submitted += 1;
                    }
                }
            }
        }

        let raised = producer
            .await
            .map_err(|e| CliError::pipeline_execution(format!("ingest producer failed: {e}")))?;
        stats.calls_raised = raised;

        // Shutdown
        info!("Shutting down north task...");
        let report = task.shutdown().await.context("North task shutdown failed")?;

        stats.ingest = ingest_metrics.snapshot();
        stats.report = Some(report);
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            batches = stats.batches_received,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Persisted state location for the plugin
fn state_store(config: &StateConfig) -> Box<dyn StateStore> {
    match &config.path {
        Some(path) => {
            debug!(path = %path.display(), "Using file state store");
            Box::new(FileStateStore::new(path))
        }
        None => {
            debug!("No state path configured, state kept in memory");
            Box::new(MemoryStateStore::new())
        }
    }
}

/// Push every batch through the module, then close the channel
///
/// Returns the number of calls that raised back to the caller.
fn produce(module: &FilterIngestModule, channel: &IngestChannel, batches: Vec<Value>) -> u64 {
    let mut raised = 0;
    for batch in batches {
        let args = [
            ForeignObject::callback(channel.callback()),
            ForeignObject::context(channel.context()),
            ForeignObject::from(batch),
        ];
        if let Err(e) = module.filter_ingest_callback(&args) {
            warn!(error = %e, "filter_ingest_callback raised");
            raised += 1;
        }
    }
    channel.close();
    raised
}
