//! NorthTask - drives one north plugin on a dedicated blocking worker
//!
//! The adapter makes blocking foreign calls, so it lives on a
//! `spawn_blocking` thread and is fed through a bounded queue. The worker
//! owns the plugin for its whole life: init, start/start_data, the send
//! loop, then shutdown/shutdown_save_data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{ConfigMap, DeliveryConfig, DropPolicy, ReadingSet, StateStore};
use observability::{DeliveryStatsAggregator, DeliverySummary};
use plugin_host::NorthPlugin;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, TaskError};
use crate::metrics::DeliveryMetrics;

/// Outcome of a north task run
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub plugin: String,
    pub batches: u64,
    pub readings_sent: u64,
    pub readings_unsent: u64,
    pub batches_dropped: u64,
    pub retries: u64,
    /// Persisted state written to the store at shutdown
    pub state_saved: bool,
    pub summary: DeliverySummary,
}

/// Retry policy applied to undelivered readings
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    limit: u32,
    backoff: Duration,
}

/// Handle to a running north task
pub struct NorthTask {
    /// Plugin name
    name: String,
    /// Channel to send batches to worker
    tx: mpsc::Sender<ReadingSet>,
    /// Queue policy when full
    drop_policy: DropPolicy,
    /// Shared metrics
    metrics: Arc<DeliveryMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<DeliveryReport>,
}

impl NorthTask {
    /// Initialise and start `plugin`, then accept batches
    ///
    /// Persisting plugins resume from the state in `store`, if any.
    ///
    /// # Errors
    /// Init, start or state-load failure; the plugin is shut down again when
    /// it got as far as init.
    #[instrument(
        name = "north_task_start",
        skip(plugin, config, delivery, store),
        fields(plugin = %plugin.name())
    )]
    pub async fn start(
        plugin: NorthPlugin,
        config: ConfigMap,
        delivery: &DeliveryConfig,
        store: Box<dyn StateStore>,
    ) -> Result<Self> {
        let name = plugin.name().to_string();
        let (tx, rx) = mpsc::channel(delivery.queue_capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();
        let metrics = Arc::new(DeliveryMetrics::new());
        let policy = RetryPolicy {
            limit: delivery.retry_limit,
            backoff: delivery.retry_backoff(),
        };

        let worker_metrics = Arc::clone(&metrics);
        let worker_handle = tokio::task::spawn_blocking(move || {
            north_worker(plugin, config, store, rx, ready_tx, worker_metrics, policy)
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(plugin = %name, "north task started");
                Ok(Self {
                    name,
                    tx,
                    drop_policy: delivery.drop_policy,
                    metrics,
                    worker_handle,
                })
            }
            Ok(Err(e)) => {
                error!(plugin = %name, error = %e, "north task failed to start");
                Err(e)
            }
            Err(_) => {
                let message = match worker_handle.await {
                    Err(e) => e.to_string(),
                    Ok(_) => "worker exited before start".to_string(),
                };
                Err(TaskError::worker(name, message))
            }
        }
    }

    /// Get plugin name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<DeliveryMetrics> {
        &self.metrics
    }

    /// Queue a batch (non-blocking)
    ///
    /// Returns true if queued, false if the queue is full (batch dropped)
    pub fn try_send(&self, batch: ReadingSet) -> bool {
        match self.tx.try_send(batch) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(batch)) => {
                self.metrics.inc_dropped_count();
                observability::record_batch_dropped(&self.name, batch.len());
                warn!(
                    plugin = %self.name,
                    readings = batch.len(),
                    "Queue full, batch dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(plugin = %self.name, "North worker closed unexpectedly");
                false
            }
        }
    }

    /// Queue a batch according to the drop policy
    ///
    /// `DropNewest` behaves like [`try_send`](Self::try_send); `Block` waits
    /// for room.
    pub async fn submit(&self, batch: ReadingSet) -> Result<bool> {
        match self.drop_policy {
            DropPolicy::DropNewest => Ok(self.try_send(batch)),
            DropPolicy::Block => {
                self.tx.send(batch).await.map_err(|_| TaskError::Closed {
                    plugin: self.name.clone(),
                })?;
                Ok(true)
            }
        }
    }

    /// Drain the queue, shut the plugin down and report
    #[instrument(name = "north_task_shutdown", skip(self), fields(plugin = %self.name))]
    pub async fn shutdown(self) -> Result<DeliveryReport> {
        // Drop sender to signal worker to stop
        drop(self.tx);
        let mut report = self
            .worker_handle
            .await
            .map_err(|e| TaskError::worker(&self.name, e.to_string()))?;

        report.batches_dropped = self.metrics.dropped_count();
        debug!(plugin = %self.name, "NorthTask shutdown complete");
        Ok(report)
    }
}

/// Worker: owns the plugin from init to shutdown
#[instrument(
    name = "north_worker_loop",
    skip_all,
    fields(plugin = %plugin.name())
)]
fn north_worker(
    mut plugin: NorthPlugin,
    config: ConfigMap,
    mut store: Box<dyn StateStore>,
    mut rx: mpsc::Receiver<ReadingSet>,
    ready: oneshot::Sender<Result<()>>,
    metrics: Arc<DeliveryMetrics>,
    policy: RetryPolicy,
) -> DeliveryReport {
    let name = plugin.name().to_string();
    let mut stats = DeliveryStatsAggregator::new();

    if let Err(e) = activate(&mut plugin, &config, store.as_ref()) {
        if plugin.handle().is_some() {
            if let Err(e) = plugin.shutdown() {
                warn!(plugin = %name, error = %e, "shutdown after failed start failed");
            }
        }
        let _ = ready.send(Err(e));
        return report(&name, &metrics, &stats, false);
    }
    let _ = ready.send(Ok(()));

    debug!(plugin = %name, "North worker started");
    while let Some(batch) = rx.blocking_recv() {
        metrics.set_queue_len(rx.len());
        observability::record_queue_depth(&name, rx.len());
        deliver(&mut plugin, batch, policy, &metrics, &mut stats);
    }

    let state_saved = deactivate(&mut plugin, store.as_mut());
    debug!(plugin = %name, "North worker stopped");
    report(&name, &metrics, &stats, state_saved)
}

/// init, then start or start_data depending on what the store holds
fn activate(plugin: &mut NorthPlugin, config: &ConfigMap, store: &dyn StateStore) -> Result<()> {
    plugin.init(config)?;

    if !plugin.persists_data() {
        plugin.start()?;
        return Ok(());
    }

    match store.load(plugin.name())? {
        Some(stored) => {
            info!(plugin = %plugin.name(), store = store.name(), "resuming from persisted state");
            plugin.start_data(&stored)?;
        }
        None => plugin.start()?,
    }
    Ok(())
}

/// Shut the plugin down, saving its state when it persists data
fn deactivate(plugin: &mut NorthPlugin, store: &mut dyn StateStore) -> bool {
    if !plugin.persists_data() {
        if let Err(e) = plugin.shutdown() {
            error!(plugin = %plugin.name(), error = %e, "plugin shutdown failed");
        }
        return false;
    }

    let state = match plugin.shutdown_save_data() {
        Ok(state) => state,
        Err(e) => {
            error!(plugin = %plugin.name(), error = %e, "plugin shutdown failed");
            return false;
        }
    };
    match store.save(plugin.name(), &state) {
        Ok(()) => {
            info!(plugin = %plugin.name(), store = store.name(), "persisted state saved");
            true
        }
        Err(e) => {
            error!(plugin = %plugin.name(), error = %e, "failed to save persisted state");
            false
        }
    }
}

/// Send one batch, retrying the undelivered tail
fn deliver(
    plugin: &mut NorthPlugin,
    batch: ReadingSet,
    policy: RetryPolicy,
    metrics: &DeliveryMetrics,
    stats: &mut DeliveryStatsAggregator,
) {
    let offered = batch.len();
    let mut pending = batch;
    let mut delivered = 0usize;
    let mut retries = 0u32;

    metrics.inc_batch_count();

    loop {
        let started = Instant::now();
        let sent = match plugin.send(&pending) {
            Ok(sent) => (sent as usize).min(pending.len()),
            Err(e) => {
                error!(plugin = %plugin.name(), error = %e, "Send failed");
                0
            }
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        stats.record_latency(latency_ms);
        observability::record_batch_sent(plugin.name(), pending.len(), sent, latency_ms);

        delivered += sent;
        metrics.add_sent(sent);

        // Readings [sent, len) were not delivered
        let unsent = pending.split_off(sent);
        if unsent.is_empty() {
            break;
        }

        if retries >= policy.limit {
            warn!(
                plugin = %plugin.name(),
                unsent = unsent.len(),
                retries,
                "retry limit reached, readings not delivered"
            );
            metrics.add_unsent(unsent.len());
            observability::record_readings_unsent(plugin.name(), unsent.len());
            break;
        }

        retries += 1;
        metrics.inc_retry_count();
        debug!(
            plugin = %plugin.name(),
            unsent = unsent.len(),
            attempt = retries,
            "retrying undelivered readings"
        );
        if !policy.backoff.is_zero() {
            std::thread::sleep(policy.backoff);
        }
        pending = unsent;
    }

    stats.record_batch(offered, delivered, retries);
}

fn report(
    name: &str,
    metrics: &DeliveryMetrics,
    stats: &DeliveryStatsAggregator,
    state_saved: bool,
) -> DeliveryReport {
    DeliveryReport {
        plugin: name.to_string(),
        batches: metrics.batch_count(),
        readings_sent: metrics.sent_count(),
        readings_unsent: metrics.unsent_count(),
        batches_dropped: metrics.dropped_count(),
        retries: metrics.retry_count(),
        state_saved,
        summary: stats.summary(),
    }
}
