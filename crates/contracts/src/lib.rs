//! # Contracts
//!
//! Frozen interface contracts shared by the host, the plugins and the ingest
//! bridge. All business crates can only depend on this crate, reverse
//! dependencies are prohibited.
//!
//! ## Ownership Model
//! - `Reading` is move-only
//! - `ReadingSet` owns its readings; egress borrows it, ingress moves it

mod error;
mod reading;
mod reading_set;
mod service_config;
mod state;

pub use error::*;
pub use reading::*;
pub use reading_set::ReadingSet;
pub use service_config::*;
pub use state::{ConfigMap, PersistedState, StateStore};
