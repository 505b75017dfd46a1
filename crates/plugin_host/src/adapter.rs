//! North plugin adapter
//!
//! Drives one plugin instance through `Unloaded -> Initialized -> Started ->
//! Shutdown`. Optional entry points that the plugin does not export are
//! skipped; calls outside the legal state fail with
//! [`PluginError::Lifecycle`] without entering the plugin.

use std::ffi::{c_char, c_void, CString};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use contracts::{ConfigMap, PersistedState, ReadingSet};
use tracing::{debug, error, info, instrument, warn};

use crate::abi::{decode_config, encode_config, encode_readings, read_c_str, RawHandle};
use crate::error::{PluginError, Result};
use crate::registry::{EntryPointTable, ShutdownSlot, StartSlot};

/// Lifecycle state of a plugin instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Initialized,
    Started,
    /// Terminal
    Shutdown,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "Unloaded",
            Self::Initialized => "Initialized",
            Self::Started => "Started",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Plugin instance returned by `plugin_init`
///
/// Owned by the adapter and consumed by shutdown.
#[derive(Debug)]
pub struct PluginHandle {
    raw: NonNull<c_void>,
}

// SAFETY: the instance is only ever touched by the adapter that owns the
// handle, one call at a time.
unsafe impl Send for PluginHandle {}

impl PluginHandle {
    fn as_raw(&self) -> RawHandle {
        self.raw.as_ptr()
    }
}

/// Lifecycle-managed north plugin instance
///
/// `Send` so it can move onto a delivery worker, not `Sync`: calls into one
/// instance are serialized by its owner.
pub struct NorthPlugin {
    table: Arc<EntryPointTable>,
    handle: Option<PluginHandle>,
    state: PluginState,
}

impl NorthPlugin {
    /// Wrap a resolved entry-point table; no plugin code runs yet
    pub fn new(table: Arc<EntryPointTable>) -> Self {
        Self {
            table,
            handle: None,
            state: PluginState::Unloaded,
        }
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn persists_data(&self) -> bool {
        self.table.persists_data()
    }

    /// Bound instance, present between init and shutdown
    pub fn handle(&self) -> Option<&PluginHandle> {
        self.handle.as_ref()
    }

    pub fn table(&self) -> &Arc<EntryPointTable> {
        &self.table
    }

    /// Create the plugin instance from `config`
    ///
    /// # Errors
    /// - Lifecycle error unless `Unloaded`
    /// - [`PluginError::InitFailed`] when the plugin returns no instance
    #[instrument(name = "north_plugin_init", skip(self, config), fields(plugin = %self.table.name()))]
    pub fn init(&mut self, config: &ConfigMap) -> Result<&PluginHandle> {
        self.expect_state("init", &[PluginState::Unloaded])?;

        let config = encode_config(config)?;
        // SAFETY: `config` outlives the call and is NUL-terminated.
        let raw = unsafe { (self.table.init)(config.as_ptr()) };
        let Some(raw) = NonNull::new(raw) else {
            error!(plugin = %self.name(), "plugin init returned no handle");
            return Err(PluginError::InitFailed {
                plugin: self.name().to_string(),
            });
        };

        self.state = PluginState::Initialized;
        info!(plugin = %self.name(), "plugin initialized");
        Ok(self.handle.insert(PluginHandle { raw }))
    }

    /// Start without persisted state
    #[instrument(name = "north_plugin_start", skip(self), fields(plugin = %self.table.name()))]
    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", &[PluginState::Initialized])?;
        let raw = self.raw("start")?;

        match self.table.start {
            // SAFETY: `raw` is the live instance created by this table's init.
            Some(StartSlot::Plain(start)) => unsafe { start(raw) },
            Some(StartSlot::Persisted(start_data)) => {
                let empty = CString::default();
                unsafe { start_data(raw, empty.as_ptr()) }
            }
            None => debug!(plugin = %self.name(), "plugin has no start hook"),
        }

        self.state = PluginState::Started;
        Ok(())
    }

    /// Start, resuming from `stored`
    #[instrument(
        name = "north_plugin_start_data",
        skip(self, stored),
        fields(plugin = %self.table.name(), state_len = stored.as_str().len())
    )]
    pub fn start_data(&mut self, stored: &PersistedState) -> Result<()> {
        self.expect_state("start_data", &[PluginState::Initialized])?;
        let raw = self.raw("start_data")?;

        match self.table.start {
            Some(StartSlot::Persisted(start_data)) => {
                let stored = CString::new(stored.as_str())
                    .map_err(|e| PluginError::marshal(self.name(), format!("persisted state: {e}")))?;
                // SAFETY: live instance; `stored` outlives the call.
                unsafe { start_data(raw, stored.as_ptr()) }
            }
            Some(StartSlot::Plain(start)) => {
                debug!(plugin = %self.name(), "plugin does not persist data, stored state ignored");
                unsafe { start(raw) }
            }
            None => debug!(plugin = %self.name(), "plugin has no start hook"),
        }

        self.state = PluginState::Started;
        Ok(())
    }

    /// Hand `readings` to the plugin, returning the delivered count
    ///
    /// The batch is only borrowed. The count is returned as reported; zero
    /// means nothing was delivered.
    #[instrument(
        name = "north_plugin_send",
        skip(self, readings),
        fields(plugin = %self.table.name(), readings = readings.len())
    )]
    pub fn send(&mut self, readings: &ReadingSet) -> Result<u32> {
        self.expect_state("send", &[PluginState::Started])?;
        let raw = self.raw("send")?;

        let payload = encode_readings(readings)?;
        // SAFETY: live instance; `payload` is borrowed for the call only.
        let sent = unsafe { (self.table.send)(raw, payload.as_ptr(), payload.len()) };

        if sent as usize > readings.len() {
            warn!(
                plugin = %self.name(),
                sent,
                readings = readings.len(),
                "plugin reported more readings than it was given"
            );
        }
        debug!(plugin = %self.name(), sent, "batch handed to plugin");
        Ok(sent)
    }

    /// Configuration defaults reported by the plugin
    ///
    /// Empty when the plugin does not export `plugin_config`.
    pub fn config(&self) -> Result<ConfigMap> {
        self.expect_state(
            "config",
            &[
                PluginState::Unloaded,
                PluginState::Initialized,
                PluginState::Started,
            ],
        )?;

        let Some(config) = self.table.config else {
            return Ok(ConfigMap::new());
        };
        // SAFETY: `plugin_config` takes no arguments and returns an owned
        // string (or null).
        let raw = unsafe { config() };
        match self.take_string(raw)? {
            Some(json) => Ok(decode_config(&json)?),
            None => Ok(ConfigMap::new()),
        }
    }

    /// Release the plugin instance, discarding any state
    #[instrument(name = "north_plugin_shutdown", skip(self), fields(plugin = %self.table.name()))]
    pub fn shutdown(&mut self) -> Result<()> {
        let handle = self.take_handle("shutdown")?;
        let raw = handle.as_raw();

        match self.table.shutdown {
            // SAFETY: `handle` was moved out; the instance is not used again.
            Some(ShutdownSlot::Plain(shutdown)) => unsafe { shutdown(raw) },
            Some(ShutdownSlot::Persisted(shutdown_data)) => {
                let state = unsafe { shutdown_data(raw) };
                if let Err(e) = self.take_string(state) {
                    warn!(plugin = %self.name(), error = %e, "discarded state was malformed");
                }
            }
            None => debug!(plugin = %self.name(), "plugin has no shutdown hook"),
        }

        info!(plugin = %self.name(), "plugin shut down");
        Ok(())
    }

    /// Release the plugin instance, returning its persisted state
    ///
    /// Empty for plugins that do not persist data.
    #[instrument(name = "north_plugin_shutdown_save_data", skip(self), fields(plugin = %self.table.name()))]
    pub fn shutdown_save_data(&mut self) -> Result<PersistedState> {
        let handle = self.take_handle("shutdown_save_data")?;
        let raw = handle.as_raw();

        let state = match self.table.shutdown {
            Some(ShutdownSlot::Persisted(shutdown_data)) => {
                // SAFETY: `handle` was moved out; the instance is not used again.
                let state = unsafe { shutdown_data(raw) };
                self.take_string(state)?
                    .map(PersistedState::from)
                    .unwrap_or_default()
            }
            Some(ShutdownSlot::Plain(shutdown)) => {
                unsafe { shutdown(raw) };
                PersistedState::default()
            }
            None => PersistedState::default(),
        };

        info!(plugin = %self.name(), state_len = state.as_str().len(), "plugin shut down, state saved");
        Ok(state)
    }

    fn expect_state(&self, operation: &'static str, allowed: &[PluginState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        error!(
            plugin = %self.name(),
            operation,
            state = %self.state,
            "plugin operation outside its lifecycle"
        );
        Err(self.lifecycle_error(operation))
    }

    fn lifecycle_error(&self, operation: &'static str) -> PluginError {
        PluginError::Lifecycle {
            plugin: self.name().to_string(),
            operation,
            state: self.state,
        }
    }

    fn raw(&self, operation: &'static str) -> Result<RawHandle> {
        self.handle
            .as_ref()
            .map(PluginHandle::as_raw)
            .ok_or_else(|| self.lifecycle_error(operation))
    }

    /// Move the handle out and enter `Shutdown`
    fn take_handle(&mut self, operation: &'static str) -> Result<PluginHandle> {
        self.expect_state(operation, &[PluginState::Initialized, PluginState::Started])?;
        let handle = self
            .handle
            .take()
            .ok_or_else(|| self.lifecycle_error(operation))?;
        self.state = PluginState::Shutdown;
        Ok(handle)
    }

    /// Copy a plugin-allocated string and release it
    fn take_string(&self, raw: *mut c_char) -> Result<Option<String>> {
        if raw.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null strings returned by the plugin are NUL-terminated
        // and stay valid until handed to `plugin_free_string`.
        let copied = unsafe { read_c_str(raw) }.map(|s| s.map(str::to_string));
        match self.table.free_string {
            Some(free_string) => unsafe { free_string(raw) },
            None => warn!(plugin = %self.name(), "no plugin_free_string, string leaked"),
        }
        copied.map_err(|e| PluginError::marshal(self.name(), e.to_string()))
    }
}

impl Drop for NorthPlugin {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!(
                plugin = %self.name(),
                state = %self.state,
                "plugin dropped without shutdown, instance not released"
            );
        }
    }
}

impl fmt::Debug for NorthPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NorthPlugin")
            .field("name", &self.name())
            .field("state", &self.state)
            .finish()
    }
}
