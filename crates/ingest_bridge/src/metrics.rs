//! Ingest bridge counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-bridge counters
#[derive(Debug, Default)]
pub struct IngestMetrics {
    batches_accepted: AtomicU64,
    readings_accepted: AtomicU64,
    batches_rejected: AtomicU64,
    batches_dropped: AtomicU64,
    readings_dropped: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch delivered to the callback
    pub fn record_accepted(&self, readings: usize) {
        self.batches_accepted.fetch_add(1, Ordering::Relaxed);
        self.readings_accepted
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    /// Call aborted on a contract violation
    pub fn record_rejected(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Batch dropped by a full ingest channel
    pub fn record_dropped(&self, readings: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.readings_dropped
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        IngestMetricsSnapshot {
            batches_accepted: self.batches_accepted.load(Ordering::Relaxed),
            readings_accepted: self.readings_accepted.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestMetricsSnapshot {
    pub batches_accepted: u64,
    pub readings_accepted: u64,
    pub batches_rejected: u64,
    pub batches_dropped: u64,
    pub readings_dropped: u64,
}
