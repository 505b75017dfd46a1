//! Ingest channel - callback/context pair feeding a bounded queue
//!
//! The foreign filter thread pushes with `try_send` and never blocks; the
//! native pipeline consumes with `recv().await`. A full queue drops the
//! incoming batch.

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::ReadingSet;
use tracing::{error, trace, warn};

use crate::callback::{IngestCallback, IngestContext};
use crate::metrics::IngestMetrics;

/// Sending half, carried as the callback context
struct ChannelSink {
    name: String,
    tx: Sender<ReadingSet>,
    metrics: Arc<IngestMetrics>,
}

impl ChannelSink {
    fn push(&self, readings: ReadingSet) {
        match self.tx.try_send(readings) {
            Ok(()) => {
                trace!(channel = %self.name, queued = self.tx.len(), "batch queued");
            }
            Err(TrySendError::Full(readings)) => {
                self.metrics.record_dropped(readings.len());
                observability::record_ingest_batch(&self.name, "dropped", readings.len());
                warn!(
                    channel = %self.name,
                    readings = readings.len(),
                    "ingest queue full, batch dropped"
                );
            }
            Err(TrySendError::Closed(readings)) => {
                warn!(
                    channel = %self.name,
                    readings = readings.len(),
                    "ingest queue closed, batch discarded"
                );
            }
        }
    }
}

fn forward(context: &IngestContext, readings: ReadingSet) {
    match context.downcast_ref::<ChannelSink>() {
        Some(sink) => sink.push(readings),
        None => error!("ingest channel callback called with a foreign context"),
    }
}

/// Bounded queue between the ingest bridge and the native pipeline
pub struct IngestChannel {
    callback: IngestCallback,
    context: IngestContext,
    rx: Receiver<ReadingSet>,
}

impl IngestChannel {
    /// Create a channel holding at most `capacity` batches
    pub fn bounded(name: impl Into<String>, capacity: usize, metrics: Arc<IngestMetrics>) -> Self {
        let name = name.into();
        let (tx, rx) = bounded(capacity.max(1));

        Self {
            callback: IngestCallback::new(name.clone(), forward),
            context: IngestContext::new(ChannelSink { name, tx, metrics }),
            rx,
        }
    }

    /// Callback to register with the bridge
    pub fn callback(&self) -> IngestCallback {
        self.callback.clone()
    }

    /// Context to register with the bridge
    pub fn context(&self) -> IngestContext {
        self.context.clone()
    }

    /// Consumer side; may be cloned
    pub fn receiver(&self) -> Receiver<ReadingSet> {
        self.rx.clone()
    }

    /// Close the queue; queued batches can still be received
    pub fn close(&self) -> bool {
        self.rx.close()
    }
}
