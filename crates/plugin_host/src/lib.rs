//! # Plugin Host
//!
//! North plugin boundary: the C ABI, the registry that binds a plugin's
//! entry points once at load time, the lifecycle adapter the delivery task
//! drives, and the SDK plugins are written against.
//!
//! ## Flow
//! ```text
//! PluginModule ──resolve──▶ EntryPointTable ──▶ NorthPlugin
//!  (libloading / static)      (immutable, Arc)     init → start / start_data
//!                                                   send* → shutdown / shutdown_save_data
//! ```

pub mod abi;
pub mod adapter;
pub mod error;
pub mod module;
pub mod registry;
pub mod sdk;

pub use abi::{Capabilities, NORTH_ABI_VERSION};
pub use adapter::{NorthPlugin, PluginHandle, PluginState};
pub use error::{PluginError, Result};
pub use module::{PluginModule, SharedLibrary, StaticModule, SymbolAddress};
pub use registry::{resolve, EntryPointTable, PluginRegistry, Resolution};
pub use sdk::NorthPluginApi;
