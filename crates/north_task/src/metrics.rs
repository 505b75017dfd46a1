//! Delivery metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for one north task
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Batches taken from the queue
    batch_count: AtomicU64,
    /// Readings reported delivered by the plugin
    sent_count: AtomicU64,
    /// Readings abandoned after the last retry
    unsent_count: AtomicU64,
    /// Extra send attempts
    retry_count: AtomicU64,
    /// Batches dropped due to full queue
    dropped_count: AtomicU64,
}

impl DeliveryMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count.load(Ordering::Relaxed)
    }

    pub fn inc_batch_count(&self) {
        self.batch_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::Relaxed)
    }

    pub fn add_sent(&self, readings: usize) {
        self.sent_count.fetch_add(readings as u64, Ordering::Relaxed);
    }

    pub fn unsent_count(&self) -> u64 {
        self.unsent_count.load(Ordering::Relaxed)
    }

    pub fn add_unsent(&self, readings: usize) {
        self.unsent_count
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn inc_retry_count(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            batch_count: self.batch_count(),
            sent_count: self.sent_count(),
            unsent_count: self.unsent_count(),
            retry_count: self.retry_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of delivery metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub batch_count: u64,
    pub sent_count: u64,
    pub unsent_count: u64,
    pub retry_count: u64,
    pub dropped_count: u64,
}
