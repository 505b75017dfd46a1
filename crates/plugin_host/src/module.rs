//! Plugin modules - where entry points come from
//!
//! A module maps symbol names to addresses. [`SharedLibrary`] reads the
//! dynamic symbol table of a loaded library; [`StaticModule`] is an in-process
//! table for plugins linked into the host (tests, built-in plugins).

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::{debug, instrument};

use crate::error::{PluginError, Result};

/// Address of an exported symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolAddress(NonNull<c_void>);

// SAFETY: a symbol address points at code or immutable static data of a
// module that outlives every table bound from it.
unsafe impl Send for SymbolAddress {}
unsafe impl Sync for SymbolAddress {}

impl SymbolAddress {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Source of exported symbols
pub trait PluginModule: Send + Sync {
    /// Module name (used for logging and as registry key)
    fn name(&self) -> &str;

    /// Look up an exported symbol; `None` when the module does not export it
    fn lookup(&self, symbol: &str) -> Option<SymbolAddress>;
}

/// Plugin loaded from a shared library
pub struct SharedLibrary {
    name: String,
    path: PathBuf,
    library: libloading::Library,
}

impl SharedLibrary {
    /// Open a plugin library
    ///
    /// # Errors
    /// Returns [`PluginError::LibraryLoad`] when the loader rejects the file.
    #[instrument(name = "shared_library_open", skip(name, path), fields(path = %path.as_ref().display()))]
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: opening a library runs its initialisers; north plugins are
        // trusted native code selected by configuration.
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| PluginError::library_load(path.display().to_string(), e.to_string()))?;

        let name = name.into();
        debug!(plugin = %name, "plugin library opened");

        Ok(Self {
            name,
            path: path.to_path_buf(),
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PluginModule for SharedLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, symbol: &str) -> Option<SymbolAddress> {
        // SAFETY: the address is read as an untyped pointer; the registry
        // reinterprets it with the ABI signature of that symbol.
        let address = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) }.ok()?;
        SymbolAddress::new(*address)
    }
}

impl fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedLibrary")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// In-process symbol table
#[derive(Debug)]
pub struct StaticModule {
    name: String,
    symbols: HashMap<String, SymbolAddress>,
    /// Backing storage for exported `u32` data symbols
    data: Vec<Box<u32>>,
}

impl StaticModule {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
            data: Vec::new(),
        }
    }

    /// Export a function under `symbol`
    ///
    /// `function` must be an `extern "C"` function pointer matching the ABI
    /// signature of `symbol`, cast with `as *const ()`.
    pub fn with_function(mut self, symbol: &str, function: *const ()) -> Self {
        if let Some(address) = SymbolAddress::new(function.cast_mut().cast()) {
            self.symbols.insert(symbol.to_string(), address);
        }
        self
    }

    /// Export a `u32` data symbol
    pub fn with_u32(mut self, symbol: &str, value: u32) -> Self {
        let boxed = Box::new(value);
        let ptr = (&*boxed as *const u32).cast_mut().cast::<c_void>();
        if let Some(address) = SymbolAddress::new(ptr) {
            self.symbols.insert(symbol.to_string(), address);
        }
        self.data.push(boxed);
        self
    }

    /// Remove an exported symbol
    pub fn without(mut self, symbol: &str) -> Self {
        self.symbols.remove(symbol);
        self
    }
}

impl PluginModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, symbol: &str) -> Option<SymbolAddress> {
        self.symbols.get(symbol).copied()
    }
}
