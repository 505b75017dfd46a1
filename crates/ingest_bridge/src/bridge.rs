//! Ingest bridge - foreign batch in, one owned ReadingSet out

use std::sync::Arc;

use contracts::ReadingSet;
use tracing::{debug, error, instrument};

use crate::callback::{IngestCallback, IngestContext};
use crate::convert::readings_from_value;
use crate::error::{IngestError, Result};
use crate::foreign::ForeignObject;
use crate::metrics::IngestMetrics;

/// What happened to one `ingest` call
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Callback invoked once with this many readings
    Delivered { readings: usize },
    /// Contract violation, callback not invoked
    Rejected(IngestError),
}

impl IngestOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Readings handed to the callback
    pub fn delivered(&self) -> usize {
        match self {
            Self::Delivered { readings } => *readings,
            Self::Rejected(_) => 0,
        }
    }
}

/// Bridge between a foreign filter and the native ingestion callback
#[derive(Debug, Clone)]
pub struct IngestBridge {
    name: String,
    metrics: Arc<IngestMetrics>,
}

impl IngestBridge {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_metrics(name, Arc::new(IngestMetrics::new()))
    }

    /// Share counters with other components (e.g. an ingest channel)
    pub fn with_metrics(name: impl Into<String>, metrics: Arc<IngestMetrics>) -> Self {
        Self {
            name: name.into(),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        self.metrics.clone()
    }

    /// Convert `batch` and hand it to `callback`
    ///
    /// On success the callback runs exactly once, on this thread, and owns
    /// the new ReadingSet. Any contract violation is logged and the call is
    /// dropped without invoking anything.
    #[instrument(name = "ingest_bridge_ingest", skip_all, fields(bridge = %self.name))]
    pub fn ingest(
        &self,
        callback: Option<&ForeignObject>,
        context: Option<&ForeignObject>,
        batch: Option<&ForeignObject>,
    ) -> IngestOutcome {
        match self.prepare(callback, context, batch) {
            Ok((callback, context, readings)) => {
                let count = readings.len();
                debug!(
                    bridge = %self.name,
                    callback = %callback.name(),
                    readings = count,
                    "invoking ingest callback"
                );
                callback.invoke(context, readings);

                self.metrics.record_accepted(count);
                observability::record_ingest_batch(&self.name, "accepted", count);
                IngestOutcome::Delivered { readings: count }
            }
            Err(e) => {
                error!(
                    bridge = %self.name,
                    kind = e.kind(),
                    error = %e,
                    "ingest call dropped"
                );
                self.metrics.record_rejected();
                observability::record_ingest_batch(&self.name, "rejected", 0);
                IngestOutcome::Rejected(e)
            }
        }
    }

    fn prepare<'a>(
        &self,
        callback: Option<&'a ForeignObject>,
        context: Option<&'a ForeignObject>,
        batch: Option<&ForeignObject>,
    ) -> Result<(&'a IngestCallback, &'a IngestContext, ReadingSet)> {
        let callback = callback.ok_or(IngestError::MissingArgument {
            argument: "callback",
        })?;
        let context = context.ok_or(IngestError::MissingArgument {
            argument: "context",
        })?;
        let batch = batch.ok_or(IngestError::MissingArgument {
            argument: "readings",
        })?;

        let readings = match batch {
            ForeignObject::Value(value) => readings_from_value(value)?,
            other => {
                return Err(IngestError::NotASequence {
                    found: other.type_name(),
                })
            }
        };
        let readings = ReadingSet::new(readings);

        Ok((callback.as_callback()?, context.as_context()?, readings))
    }
}
