//! Delivery and ingest metrics
//!
//! Global counters go through the `metrics` facade (exported by Prometheus
//! when installed); [`DeliveryStatsAggregator`] keeps in-memory statistics for
//! the end-of-run summary.

use metrics::{counter, gauge, histogram};

/// Record one batch handed to a north plugin
///
/// Called once per send attempt, retries included.
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_batch_sent;
///
/// let sent = plugin.send(&batch)?;
/// record_batch_sent("north_file", batch.len(), sent as usize, elapsed_ms);
/// ```
pub fn record_batch_sent(plugin: &str, offered: usize, sent: usize, latency_ms: f64) {
    counter!("north_batches_total", "plugin" => plugin.to_string()).increment(1);
    counter!("north_readings_sent_total", "plugin" => plugin.to_string())
        .increment(sent as u64);

    if sent < offered {
        counter!("north_batches_short_total", "plugin" => plugin.to_string()).increment(1);
    }

    histogram!("north_send_latency_ms", "plugin" => plugin.to_string()).record(latency_ms);
    histogram!("north_batch_size", "plugin" => plugin.to_string()).record(offered as f64);
}

/// Record readings given up on after the retry budget ran out
pub fn record_readings_unsent(plugin: &str, count: usize) {
    if count > 0 {
        counter!("north_readings_unsent_total", "plugin" => plugin.to_string())
            .increment(count as u64);
    }
}

/// Record a batch dropped because the delivery queue was full
pub fn record_batch_dropped(plugin: &str, readings: usize) {
    counter!("north_batches_dropped_total", "plugin" => plugin.to_string()).increment(1);
    counter!("north_readings_dropped_total", "plugin" => plugin.to_string())
        .increment(readings as u64);
}

/// Record delivery queue depth
pub fn record_queue_depth(plugin: &str, depth: usize) {
    gauge!("north_queue_depth", "plugin" => plugin.to_string()).set(depth as f64);
}

/// Record the outcome of one ingest bridge call
///
/// `status` is `accepted`, `rejected` or `dropped`.
pub fn record_ingest_batch(bridge: &str, status: &'static str, readings: usize) {
    counter!(
        "ingest_batches_total",
        "bridge" => bridge.to_string(),
        "status" => status
    )
    .increment(1);

    if readings > 0 {
        counter!(
            "ingest_readings_total",
            "bridge" => bridge.to_string(),
            "status" => status
        )
        .increment(readings as u64);
    }
}

/// Delivery statistics aggregator
///
/// Aggregates per-batch outcomes in memory for the run summary.
#[derive(Debug, Clone, Default)]
pub struct DeliveryStatsAggregator {
    /// Batches taken from the queue
    pub total_batches: u64,

    /// Readings offered to the plugin (first attempt only)
    pub total_readings: u64,

    /// Readings the plugin reported as delivered
    pub total_sent: u64,

    /// Readings abandoned after the last retry
    pub total_unsent: u64,

    /// Extra send attempts
    pub total_retries: u64,

    /// Batches that needed at least one retry
    pub short_batches: u64,

    /// Batch size statistics
    pub batch_size_stats: RunningStats,

    /// Per-attempt send latency statistics (ms)
    pub latency_stats: RunningStats,
}

impl DeliveryStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one finished batch
    pub fn record_batch(&mut self, offered: usize, sent: usize, retries: u32) {
        self.total_batches += 1;
        self.total_readings += offered as u64;
        self.total_sent += sent as u64;
        self.total_unsent += offered.saturating_sub(sent) as u64;
        self.total_retries += u64::from(retries);
        if retries > 0 {
            self.short_batches += 1;
        }
        self.batch_size_stats.push(offered as f64);
    }

    /// Account for one send attempt
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.latency_stats.push(latency_ms);
    }

    /// Generate summary report
    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            total_batches: self.total_batches,
            total_readings: self.total_readings,
            total_sent: self.total_sent,
            total_unsent: self.total_unsent,
            total_retries: self.total_retries,
            short_batches: self.short_batches,
            delivery_rate: if self.total_readings > 0 {
                self.total_sent as f64 / self.total_readings as f64 * 100.0
            } else {
                0.0
            },
            batch_size: StatsSummary::from(&self.batch_size_stats),
            send_latency_ms: StatsSummary::from(&self.latency_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Delivery summary
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub total_batches: u64,
    pub total_readings: u64,
    pub total_sent: u64,
    pub total_unsent: u64,
    pub total_retries: u64,
    pub short_batches: u64,
    pub delivery_rate: f64,
    pub batch_size: StatsSummary,
    pub send_latency_ms: StatsSummary,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(
            f,
            "Readings sent: {}/{} ({:.2}%)",
            self.total_sent, self.total_readings, self.delivery_rate
        )?;
        writeln!(f, "Readings unsent: {}", self.total_unsent)?;
        writeln!(
            f,
            "Retries: {} ({} short batches)",
            self.total_retries, self.short_batches
        )?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Send latency (ms): {}", self.send_latency_ms)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
