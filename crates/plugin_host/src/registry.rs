//! Plugin handle registry
//!
//! Resolves a module's exported entry points once, at load time, into an
//! immutable [`EntryPointTable`]. Resolution only reads the symbol table (and
//! the two `u32` data symbols); it never calls into the plugin.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::abi::{
    symbols, Capabilities, ConfigFn, FreeStringFn, InitFn, SendFn, ShutdownDataFn, ShutdownFn,
    StartDataFn, StartFn, NORTH_ABI_VERSION,
};
use crate::error::{PluginError, Result};
use crate::module::{PluginModule, SharedLibrary, SymbolAddress};

/// Outcome of resolving one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Symbol exported at this address
    Bound(SymbolAddress),
    /// Symbol not exported
    Unavailable,
}

/// Resolve a single symbol of `module`
pub fn resolve(module: &dyn PluginModule, symbol: &str) -> Resolution {
    match module.lookup(symbol) {
        Some(address) => Resolution::Bound(address),
        None => Resolution::Unavailable,
    }
}

/// Reinterpret a resolved address as an ABI function pointer
macro_rules! bind {
    ($address:expr, $fn_type:ty) => {
        // SAFETY: the address comes from the symbol named for this slot and the
        // ABI fixes that symbol's signature to `$fn_type`.
        unsafe { std::mem::transmute::<*mut c_void, $fn_type>($address.as_ptr()) }
    };
}

fn read_u32(module: &dyn PluginModule, symbol: &str) -> Option<u32> {
    match resolve(module, symbol) {
        // SAFETY: ABI data symbols are exported as `static u32`.
        Resolution::Bound(address) => Some(unsafe { address.as_ptr().cast::<u32>().read() }),
        Resolution::Unavailable => None,
    }
}

/// Calling convention bound to `plugin_start`
#[derive(Debug, Clone, Copy)]
pub enum StartSlot {
    Plain(StartFn),
    Persisted(StartDataFn),
}

/// Calling convention bound to `plugin_shutdown`
#[derive(Debug, Clone, Copy)]
pub enum ShutdownSlot {
    Plain(ShutdownFn),
    Persisted(ShutdownDataFn),
}

/// Typed entry points of one loaded plugin
///
/// Immutable after resolution; shared read-only between adapters.
pub struct EntryPointTable {
    name: String,
    abi_version: u32,
    capabilities: Capabilities,
    pub(crate) init: InitFn,
    pub(crate) send: SendFn,
    pub(crate) start: Option<StartSlot>,
    pub(crate) shutdown: Option<ShutdownSlot>,
    pub(crate) config: Option<ConfigFn>,
    pub(crate) free_string: Option<FreeStringFn>,
    /// Keeps the code behind the function pointers mapped
    _module: Arc<dyn PluginModule>,
}

impl EntryPointTable {
    /// Resolve every slot of `module`
    ///
    /// # Errors
    /// - `plugin_init` or `plugin_send` missing
    /// - `plugin_abi_version` present but different from [`NORTH_ABI_VERSION`]
    /// - a string-returning slot bound without `plugin_free_string`
    #[instrument(name = "entry_point_table_resolve", skip(module), fields(plugin = %module.name()))]
    pub fn resolve(module: Arc<dyn PluginModule>) -> Result<Self> {
        let name = module.name().to_string();
        let m = module.as_ref();

        let abi_version = read_u32(m, symbols::ABI_VERSION).unwrap_or(NORTH_ABI_VERSION);
        if abi_version != NORTH_ABI_VERSION {
            return Err(PluginError::AbiMismatch {
                plugin: name,
                expected: NORTH_ABI_VERSION,
                found: abi_version,
            });
        }

        let capabilities = read_u32(m, symbols::CAPABILITIES)
            .map(Capabilities::from_bits)
            .unwrap_or_default();
        let persists = capabilities.contains(Capabilities::PERSIST_DATA);

        let init = match resolve(m, symbols::INIT) {
            Resolution::Bound(address) => bind!(address, InitFn),
            Resolution::Unavailable => {
                return Err(PluginError::missing_symbol(name, symbols::INIT))
            }
        };
        let send = match resolve(m, symbols::SEND) {
            Resolution::Bound(address) => bind!(address, SendFn),
            Resolution::Unavailable => {
                return Err(PluginError::missing_symbol(name, symbols::SEND))
            }
        };

        let start = match resolve(m, symbols::START) {
            Resolution::Bound(address) if persists => {
                Some(StartSlot::Persisted(bind!(address, StartDataFn)))
            }
            Resolution::Bound(address) => Some(StartSlot::Plain(bind!(address, StartFn))),
            Resolution::Unavailable => None,
        };
        let shutdown = match resolve(m, symbols::SHUTDOWN) {
            Resolution::Bound(address) if persists => {
                Some(ShutdownSlot::Persisted(bind!(address, ShutdownDataFn)))
            }
            Resolution::Bound(address) => Some(ShutdownSlot::Plain(bind!(address, ShutdownFn))),
            Resolution::Unavailable => None,
        };
        let config = match resolve(m, symbols::CONFIG) {
            Resolution::Bound(address) => Some(bind!(address, ConfigFn)),
            Resolution::Unavailable => None,
        };
        let free_string = match resolve(m, symbols::FREE_STRING) {
            Resolution::Bound(address) => Some(bind!(address, FreeStringFn)),
            Resolution::Unavailable => None,
        };

        let returns_strings = config.is_some() || matches!(shutdown, Some(ShutdownSlot::Persisted(_)));
        if returns_strings && free_string.is_none() {
            return Err(PluginError::missing_symbol(name, symbols::FREE_STRING));
        }

        if persists && (start.is_none() || shutdown.is_none()) {
            warn!(
                plugin = %name,
                "plugin declares persisted data but lacks a start or shutdown hook"
            );
        }

        let table = Self {
            name,
            abi_version,
            capabilities,
            init,
            send,
            start,
            shutdown,
            config,
            free_string,
            _module: module,
        };
        debug!(plugin = %table.name, slots = ?table.bound_slots(), "entry points resolved");
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi_version(&self) -> u32 {
        self.abi_version
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether start/shutdown use the persisted-state calling convention
    pub fn persists_data(&self) -> bool {
        self.capabilities.contains(Capabilities::PERSIST_DATA)
    }

    /// Slot name -> bound, for diagnostics
    pub fn bound_slots(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("init", true),
            ("start", matches!(self.start, Some(StartSlot::Plain(_)))),
            ("start_data", matches!(self.start, Some(StartSlot::Persisted(_)))),
            ("send", true),
            ("config", self.config.is_some()),
            ("shutdown", matches!(self.shutdown, Some(ShutdownSlot::Plain(_)))),
            (
                "shutdown_save_data",
                matches!(self.shutdown, Some(ShutdownSlot::Persisted(_))),
            ),
        ]
    }
}

impl fmt::Debug for EntryPointTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPointTable")
            .field("name", &self.name)
            .field("abi_version", &self.abi_version)
            .field("capabilities", &self.capabilities)
            .field("slots", &self.bound_slots())
            .finish()
    }
}

/// Registry of resolved plugins, keyed by name
#[derive(Debug, Default)]
pub struct PluginRegistry {
    tables: HashMap<String, Arc<EntryPointTable>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and register a module under its own name
    ///
    /// # Errors
    /// Resolution errors, or [`PluginError::Duplicate`] when the name is taken.
    pub fn register(&mut self, module: Arc<dyn PluginModule>) -> Result<Arc<EntryPointTable>> {
        let name = module.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(PluginError::Duplicate { name });
        }

        let table = Arc::new(EntryPointTable::resolve(module)?);
        self.tables.insert(name.clone(), Arc::clone(&table));
        info!(plugin = %name, persists = table.persists_data(), "plugin registered");
        Ok(table)
    }

    /// Open a shared library and register it as `name`
    pub fn load(&mut self, name: &str, path: impl AsRef<Path>) -> Result<Arc<EntryPointTable>> {
        if self.tables.contains_key(name) {
            return Err(PluginError::Duplicate {
                name: name.to_string(),
            });
        }
        let library = SharedLibrary::open(name, path)?;
        self.register(Arc::new(library))
    }

    /// Look up a registered plugin
    pub fn get(&self, name: &str) -> Result<Arc<EntryPointTable>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::RawHandle;
    use crate::module::StaticModule;
    use std::ffi::c_char;

    unsafe extern "C" fn init(_config: *const c_char) -> RawHandle {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn send(_handle: RawHandle, _readings: *const u8, _len: usize) -> u32 {
        0
    }

    unsafe extern "C" fn start(_handle: RawHandle) {}

    unsafe extern "C" fn config() -> *mut c_char {
        std::ptr::null_mut()
    }

    fn minimal(name: &str) -> StaticModule {
        StaticModule::new(name)
            .with_function(symbols::INIT, init as InitFn as *const ())
            .with_function(symbols::SEND, send as SendFn as *const ())
    }

    #[test]
    fn test_resolve_reports_unavailable() {
        let module = minimal("m");
        assert!(matches!(resolve(&module, symbols::INIT), Resolution::Bound(_)));
        assert_eq!(resolve(&module, symbols::START), Resolution::Unavailable);
    }

    #[test]
    fn test_minimal_table_has_no_optional_slots() {
        let table = EntryPointTable::resolve(Arc::new(minimal("m"))).unwrap();
        assert!(table.start.is_none());
        assert!(table.shutdown.is_none());
        assert!(table.config.is_none());
        assert!(!table.persists_data());
        assert_eq!(table.abi_version(), NORTH_ABI_VERSION);
    }

    #[test]
    fn test_missing_send_is_resolution_error() {
        let module = minimal("m").without(symbols::SEND);
        let err = EntryPointTable::resolve(Arc::new(module)).unwrap_err();
        assert!(err.is_resolution());
        assert!(err.to_string().contains("plugin_send"));
    }

    #[test]
    fn test_missing_init_is_resolution_error() {
        let module = minimal("m").without(symbols::INIT);
        let err = EntryPointTable::resolve(Arc::new(module)).unwrap_err();
        assert!(matches!(
            err,
            PluginError::MissingSymbol { symbol: "plugin_init", .. }
        ));
    }

    #[test]
    fn test_abi_mismatch() {
        let module = minimal("m").with_u32(symbols::ABI_VERSION, NORTH_ABI_VERSION + 1);
        let err = EntryPointTable::resolve(Arc::new(module)).unwrap_err();
        assert!(matches!(err, PluginError::AbiMismatch { found: 2, .. }));
    }

    #[test]
    fn test_capability_selects_calling_convention() {
        let plain = minimal("plain").with_function(symbols::START, start as StartFn as *const ());
        let table = EntryPointTable::resolve(Arc::new(plain)).unwrap();
        assert!(matches!(table.start, Some(StartSlot::Plain(_))));

        let persisted = minimal("persisted")
            .with_function(symbols::START, start as StartFn as *const ())
            .with_u32(symbols::CAPABILITIES, Capabilities::PERSIST_DATA.bits());
        let table = EntryPointTable::resolve(Arc::new(persisted)).unwrap();
        assert!(matches!(table.start, Some(StartSlot::Persisted(_))));
        assert!(table.persists_data());
    }

    #[test]
    fn test_config_requires_free_string() {
        let module = minimal("m").with_function(symbols::CONFIG, config as ConfigFn as *const ());
        let err = EntryPointTable::resolve(Arc::new(module)).unwrap_err();
        assert!(matches!(
            err,
            PluginError::MissingSymbol { symbol: "plugin_free_string", .. }
        ));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(minimal("dup"))).unwrap();
        let err = registry.register(Arc::new(minimal("dup"))).unwrap_err();

        assert!(matches!(err, PluginError::Duplicate { .. }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["dup"]);
    }

    #[test]
    fn test_registry_get_unknown() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(PluginError::NotFound { .. })
        ));
        assert!(registry.is_empty());
    }
}
