//! # Ingest Bridge
//!
//! Hands readings produced by a foreign filter back to the native pipeline.
//!
//! ```text
//! foreign filter ──filter_ingest_callback──▶ IngestBridge ──ReadingSet (moved)──▶ IngestCallback
//!                                               │                                    │
//!                                          validate + convert                  IngestChannel ──▶ pipeline
//! ```
//!
//! ## Contract
//! - success: the callback runs exactly once with one freshly owned batch
//! - any violation: logged, zero callback invocations

pub mod bridge;
pub mod callback;
pub mod channel;
pub mod convert;
pub mod error;
pub mod foreign;
pub mod metrics;
pub mod module;

pub use bridge::{IngestBridge, IngestOutcome};
pub use callback::{IngestCallback, IngestContext, IngestFn};
pub use channel::IngestChannel;
pub use convert::readings_from_value;
pub use error::{IngestError, Result};
pub use foreign::{Capsule, ForeignObject};
pub use metrics::{IngestMetrics, IngestMetricsSnapshot};
pub use module::{ErrorCategory, FilterIngestModule, ForeignError};
