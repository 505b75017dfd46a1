//! # North Task
//!
//! Delivery pipeline for one north plugin.
//!
//! ```text
//! producers ──try_send/submit──▶ [bounded queue] ──▶ worker (spawn_blocking)
//!                                                     init → start / start_data
//!                                                     send loop (retry unsent tail)
//!                                                     shutdown / shutdown_save_data ──▶ StateStore
//! ```

mod error;
mod handle;
mod metrics;
mod state;

pub use error::{Result, TaskError};
pub use handle::{DeliveryReport, NorthTask};
pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use state::{FileStateStore, MemoryStateStore};
