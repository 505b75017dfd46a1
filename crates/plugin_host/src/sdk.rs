//! Plugin SDK - the plugin side of the north ABI
//!
//! Implement [`NorthPluginApi`] and either export it from a `cdylib` with
//! [`export_north_plugin!`](crate::export_north_plugin) or link it into the
//! host with [`StaticModule::from_plugin`]. The trampolines below catch panics
//! and turn them into the failure value of the entry point (null handle, zero
//! count, null string).

use std::ffi::{c_char, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use contracts::{ConfigMap, PersistedState, Reading};

use crate::abi::{
    decode_config, decode_readings, encode_config, read_c_str, symbols, Capabilities, ConfigFn,
    FreeStringFn, InitFn, RawHandle, SendFn, ShutdownDataFn, ShutdownFn, StartDataFn, StartFn,
    NORTH_ABI_VERSION,
};
use crate::module::StaticModule;

/// A north plugin implementation
///
/// Only `init`, `send` and `default_config` are required; the lifecycle hooks
/// default to no-ops.
pub trait NorthPluginApi: Sized + Send + 'static {
    /// Resume from / hand back persisted state
    const PERSISTS_DATA: bool = false;

    /// Build an instance from the init configuration
    fn init(config: ConfigMap) -> Result<Self, String>;

    /// Open connections, start timers...
    ///
    /// `stored` is the state returned by the previous shutdown, `None` on a
    /// fresh start or for non-persisting plugins.
    fn start(&mut self, _stored: Option<PersistedState>) {}

    /// Deliver readings, returning how many were delivered
    fn send(&mut self, readings: &[Reading]) -> u32;

    /// Configuration defaults reported through `plugin_config`
    fn default_config() -> ConfigMap;

    /// Release the instance; persisting plugins return their state
    fn shutdown(self) -> Option<PersistedState> {
        None
    }
}

/// Capability bits of `P`
pub const fn capabilities<P: NorthPluginApi>() -> Capabilities {
    if P::PERSISTS_DATA {
        Capabilities::PERSIST_DATA
    } else {
        Capabilities::NONE
    }
}

/// `plugin_init`
///
/// # Safety
/// `config` must be null or a NUL-terminated string.
pub unsafe extern "C" fn init<P: NorthPluginApi>(config: *const c_char) -> RawHandle {
    let json = match unsafe { read_c_str(config) } {
        Ok(Some(json)) => json.to_string(),
        Ok(None) => "{}".to_string(),
        Err(_) => return ptr::null_mut(),
    };
    let Ok(config) = decode_config(&json) else {
        return ptr::null_mut();
    };

    match panic::catch_unwind(move || P::init(config)) {
        Ok(Ok(plugin)) => Box::into_raw(Box::new(plugin)).cast(),
        _ => ptr::null_mut(),
    }
}

/// `plugin_start`, plain form
///
/// # Safety
/// `handle` must come from [`init`] with the same `P` and not be shut down.
pub unsafe extern "C" fn start<P: NorthPluginApi>(handle: RawHandle) {
    let Some(plugin) = (unsafe { handle.cast::<P>().as_mut() }) else {
        return;
    };
    let _ = panic::catch_unwind(AssertUnwindSafe(|| plugin.start(None)));
}

/// `plugin_start`, persisted form
///
/// # Safety
/// As [`start`]; `stored` must be null or a NUL-terminated string.
pub unsafe extern "C" fn start_data<P: NorthPluginApi>(handle: RawHandle, stored: *const c_char) {
    let Some(plugin) = (unsafe { handle.cast::<P>().as_mut() }) else {
        return;
    };
    let stored = match unsafe { read_c_str(stored) } {
        Ok(Some(state)) if !state.is_empty() => Some(PersistedState::new(state)),
        _ => None,
    };
    let _ = panic::catch_unwind(AssertUnwindSafe(|| plugin.start(stored)));
}

/// `plugin_send`
///
/// # Safety
/// As [`start`]; `readings` must point to `len` readable bytes.
pub unsafe extern "C" fn send<P: NorthPluginApi>(
    handle: RawHandle,
    readings: *const u8,
    len: usize,
) -> u32 {
    let Some(plugin) = (unsafe { handle.cast::<P>().as_mut() }) else {
        return 0;
    };
    let bytes = if readings.is_null() || len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(readings, len) }
    };
    let Ok(readings) = decode_readings(bytes) else {
        return 0;
    };

    panic::catch_unwind(AssertUnwindSafe(|| plugin.send(&readings))).unwrap_or(0)
}

/// `plugin_config`
///
/// # Safety
/// The returned string must be released with [`free_string`].
pub unsafe extern "C" fn config<P: NorthPluginApi>() -> *mut c_char {
    panic::catch_unwind(P::default_config)
        .ok()
        .and_then(|config| encode_config(&config).ok())
        .map_or(ptr::null_mut(), CString::into_raw)
}

/// `plugin_shutdown`, plain form
///
/// # Safety
/// `handle` must come from [`init`] with the same `P`; it is freed here.
pub unsafe extern "C" fn shutdown<P: NorthPluginApi>(handle: RawHandle) {
    if handle.is_null() {
        return;
    }
    let plugin = unsafe { Box::from_raw(handle.cast::<P>()) };
    let _ = panic::catch_unwind(AssertUnwindSafe(move || plugin.shutdown()));
}

/// `plugin_shutdown`, persisted form
///
/// # Safety
/// As [`shutdown`]. The returned string must be released with
/// [`free_string`].
pub unsafe extern "C" fn shutdown_data<P: NorthPluginApi>(handle: RawHandle) -> *mut c_char {
    if handle.is_null() {
        return ptr::null_mut();
    }
    let plugin = unsafe { Box::from_raw(handle.cast::<P>()) };
    let state = panic::catch_unwind(AssertUnwindSafe(move || plugin.shutdown()))
        .ok()
        .flatten()
        .unwrap_or_default();

    CString::new(state.into_string()).map_or(ptr::null_mut(), CString::into_raw)
}

/// `plugin_free_string`
///
/// # Safety
/// `s` must be null or a string returned by this SDK.
pub unsafe extern "C" fn free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

impl StaticModule {
    /// In-process module exporting `P` through the SDK trampolines
    pub fn from_plugin<P: NorthPluginApi>(name: impl Into<String>) -> Self {
        let module = Self::new(name)
            .with_function(symbols::INIT, init::<P> as InitFn as *const ())
            .with_function(symbols::SEND, send::<P> as SendFn as *const ())
            .with_function(symbols::CONFIG, config::<P> as ConfigFn as *const ())
            .with_function(symbols::FREE_STRING, free_string as FreeStringFn as *const ())
            .with_u32(symbols::ABI_VERSION, NORTH_ABI_VERSION)
            .with_u32(symbols::CAPABILITIES, capabilities::<P>().bits());

        if P::PERSISTS_DATA {
            module
                .with_function(symbols::START, start_data::<P> as StartDataFn as *const ())
                .with_function(symbols::SHUTDOWN, shutdown_data::<P> as ShutdownDataFn as *const ())
        } else {
            module
                .with_function(symbols::START, start::<P> as StartFn as *const ())
                .with_function(symbols::SHUTDOWN, shutdown::<P> as ShutdownFn as *const ())
        }
    }
}

/// Export a [`NorthPluginApi`] implementation as the north plugin symbols of
/// a `cdylib`
///
/// ```ignore
/// plugin_host::export_north_plugin!(MyPlugin);
/// plugin_host::export_north_plugin!(MyPersistingPlugin, persist_data);
/// ```
#[macro_export]
macro_rules! export_north_plugin {
    (@common $plugin:ty, $caps:expr) => {
        const _: () = assert!(
            <$plugin as $crate::sdk::NorthPluginApi>::PERSISTS_DATA
                == $crate::abi::Capabilities::from_bits($caps)
                    .contains($crate::abi::Capabilities::PERSIST_DATA),
            "export_north_plugin!: persist_data flag does not match PERSISTS_DATA"
        );

        #[export_name = "plugin_abi_version"]
        pub static PLUGIN_ABI_VERSION: u32 = $crate::abi::NORTH_ABI_VERSION;

        #[export_name = "plugin_capabilities"]
        pub static PLUGIN_CAPABILITIES: u32 = $caps;

        #[no_mangle]
        pub unsafe extern "C" fn plugin_init(
            config: *const ::std::ffi::c_char,
        ) -> *mut ::std::ffi::c_void {
            unsafe { $crate::sdk::init::<$plugin>(config) }
        }

        #[no_mangle]
        pub unsafe extern "C" fn plugin_send(
            handle: *mut ::std::ffi::c_void,
            readings: *const u8,
            len: usize,
        ) -> u32 {
            unsafe { $crate::sdk::send::<$plugin>(handle, readings, len) }
        }

        #[no_mangle]
        pub unsafe extern "C" fn plugin_config() -> *mut ::std::ffi::c_char {
            unsafe { $crate::sdk::config::<$plugin>() }
        }

        #[no_mangle]
        pub unsafe extern "C" fn plugin_free_string(s: *mut ::std::ffi::c_char) {
            unsafe { $crate::sdk::free_string(s) }
        }
    };
    ($plugin:ty, persist_data) => {
        $crate::export_north_plugin!(
            @common $plugin,
            $crate::abi::Capabilities::PERSIST_DATA.bits()
        );

        #[no_mangle]
        pub unsafe extern "C" fn plugin_start(
            handle: *mut ::std::ffi::c_void,
            stored: *const ::std::ffi::c_char,
        ) {
            unsafe { $crate::sdk::start_data::<$plugin>(handle, stored) }
        }

        #[no_mangle]
        pub unsafe extern "C" fn plugin_shutdown(
            handle: *mut ::std::ffi::c_void,
        ) -> *mut ::std::ffi::c_char {
            unsafe { $crate::sdk::shutdown_data::<$plugin>(handle) }
        }
    };
    ($plugin:ty) => {
        $crate::export_north_plugin!(@common $plugin, $crate::abi::Capabilities::NONE.bits());

        #[no_mangle]
        pub unsafe extern "C" fn plugin_start(handle: *mut ::std::ffi::c_void) {
            unsafe { $crate::sdk::start::<$plugin>(handle) }
        }

        #[no_mangle]
        pub unsafe extern "C" fn plugin_shutdown(handle: *mut ::std::ffi::c_void) {
            unsafe { $crate::sdk::shutdown::<$plugin>(handle) }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Datapoint, DatapointValue, ReadingSet};

    use crate::abi::encode_readings;

    struct Echo {
        prefix: String,
    }

    impl NorthPluginApi for Echo {
        fn init(config: ConfigMap) -> Result<Self, String> {
            let prefix = config.get("prefix").cloned().ok_or("prefix missing")?;
            Ok(Self { prefix })
        }

        fn send(&mut self, readings: &[Reading]) -> u32 {
            readings
                .iter()
                .filter(|r| r.asset_code().starts_with(&self.prefix))
                .count() as u32
        }

        fn default_config() -> ConfigMap {
            ConfigMap::from([("prefix".to_string(), "".to_string())])
        }
    }

    struct Panicky;

    impl NorthPluginApi for Panicky {
        fn init(_config: ConfigMap) -> Result<Self, String> {
            Ok(Self)
        }

        fn send(&mut self, _readings: &[Reading]) -> u32 {
            panic!("send exploded");
        }

        fn default_config() -> ConfigMap {
            ConfigMap::new()
        }
    }

    fn config_json(pairs: &[(&str, &str)]) -> CString {
        let config: ConfigMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        encode_config(&config).unwrap()
    }

    #[test]
    fn test_init_failure_yields_null_handle() {
        let config = config_json(&[]);
        let handle = unsafe { init::<Echo>(config.as_ptr()) };
        assert!(handle.is_null());
    }

    #[test]
    fn test_send_counts_through_trampoline() {
        let config = config_json(&[("prefix", "pump")]);
        let handle = unsafe { init::<Echo>(config.as_ptr()) };
        assert!(!handle.is_null());

        let batch = ReadingSet::new(vec![
            Reading::new("pump1", vec![Datapoint::new("rpm", DatapointValue::Integer(1))]),
            Reading::new("valve", vec![Datapoint::new("open", DatapointValue::Integer(0))]),
        ]);
        let bytes = encode_readings(&batch).unwrap();
        let sent = unsafe { send::<Echo>(handle, bytes.as_ptr(), bytes.len()) };
        assert_eq!(sent, 1);

        unsafe { shutdown::<Echo>(handle) };
    }

    #[test]
    fn test_panic_in_send_reports_zero() {
        let config = config_json(&[]);
        let handle = unsafe { init::<Panicky>(config.as_ptr()) };
        let bytes = b"[]";
        let sent = unsafe { send::<Panicky>(handle, bytes.as_ptr(), bytes.len()) };
        assert_eq!(sent, 0);
        unsafe { shutdown::<Panicky>(handle) };
    }

    #[test]
    fn test_config_string_round_trip() {
        let raw = unsafe { config::<Echo>() };
        let json = unsafe { read_c_str(raw) }.unwrap().unwrap().to_string();
        unsafe { free_string(raw) };

        let config = decode_config(&json).unwrap();
        assert_eq!(config.get("prefix").map(String::as_str), Some(""));
    }

    #[test]
    fn test_from_plugin_declares_capabilities() {
        assert_eq!(capabilities::<Echo>(), Capabilities::NONE);
        let module = StaticModule::from_plugin::<Echo>("echo");
        let table = crate::EntryPointTable::resolve(std::sync::Arc::new(module)).unwrap();
        assert!(!table.persists_data());
        assert!(table.bound_slots().contains(&("start", true)));
    }
}
