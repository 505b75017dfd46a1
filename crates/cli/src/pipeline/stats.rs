//! Pipeline statistics.

use std::time::Duration;

use ingest_bridge::IngestMetricsSnapshot;
use north_task::DeliveryReport;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Batches taken from the ingest queue
    pub batches_received: u64,

    /// Readings taken from the ingest queue
    pub readings_received: u64,

    /// Batches accepted by the north task queue
    pub batches_submitted: u64,

    /// Ingest calls that raised to the caller
    pub calls_raised: u64,

    /// Ingest bridge counters
    pub ingest: IngestMetricsSnapshot,

    /// Delivery outcome reported by the north task
    pub report: Option<DeliveryReport>,

    /// Total duration of the pipeline run
    pub duration: Duration,
}

impl PipelineStats {
    /// Readings per second delivered by the plugin
    pub fn throughput(&self) -> f64 {
        let sent = self.report.as_ref().map_or(0, |r| r.readings_sent);
        if self.duration.as_secs_f64() > 0.0 {
            sent as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Batches received: {}", self.batches_received);
        println!("   ├─ Readings received: {}", self.readings_received);
        println!("   ├─ Batches queued for delivery: {}", self.batches_submitted);
        println!("   └─ Throughput: {:.2} readings/s", self.throughput());

        println!("\nIngest");
        println!("   ├─ Batches accepted: {}", self.ingest.batches_accepted);
        println!("   ├─ Batches rejected: {}", self.ingest.batches_rejected);
        println!("   ├─ Batches dropped: {}", self.ingest.batches_dropped);
        println!("   └─ Calls raised: {}", self.calls_raised);

        if let Some(report) = &self.report {
            println!("\nDelivery ({})", report.plugin);
            println!("   ├─ Readings sent: {}", report.readings_sent);
            println!("   ├─ Readings unsent: {}", report.readings_unsent);
            println!("   ├─ Retries: {}", report.retries);
            println!("   ├─ Batches dropped: {}", report.batches_dropped);
            println!("   └─ State saved: {}", report.state_saved);
            println!("\n{}", report.summary);
        }
    }
}
