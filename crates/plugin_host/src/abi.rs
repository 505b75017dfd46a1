//! North plugin ABI
//!
//! C calling convention. Strings are NUL-terminated UTF-8; configuration maps
//! and reading batches cross as JSON. Every string a plugin returns is handed
//! back to `plugin_free_string` so it is released by the allocator that made
//! it.
//!
//! | Symbol | Signature |
//! |---|---|
//! | `plugin_init` | [`InitFn`] (mandatory) |
//! | `plugin_start` | [`StartFn`] or [`StartDataFn`] |
//! | `plugin_send` | [`SendFn`] (mandatory) |
//! | `plugin_config` | [`ConfigFn`] |
//! | `plugin_shutdown` | [`ShutdownFn`] or [`ShutdownDataFn`] |
//! | `plugin_free_string` | [`FreeStringFn`] |
//! | `plugin_abi_version` | `static u32` |
//! | `plugin_capabilities` | `static u32` ([`Capabilities`]) |
//!
//! `plugin_start` and `plugin_shutdown` each have two calling conventions;
//! [`Capabilities::PERSIST_DATA`] selects the persisted form.

use std::ffi::{c_char, c_void, CStr, CString};

use contracts::{ConfigMap, ContractError, Reading, ReadingSet};

/// ABI revision implemented by this host
pub const NORTH_ABI_VERSION: u32 = 1;

/// Exported symbol names
pub mod symbols {
    pub const INIT: &str = "plugin_init";
    pub const START: &str = "plugin_start";
    pub const SEND: &str = "plugin_send";
    pub const CONFIG: &str = "plugin_config";
    pub const SHUTDOWN: &str = "plugin_shutdown";
    pub const FREE_STRING: &str = "plugin_free_string";
    pub const ABI_VERSION: &str = "plugin_abi_version";
    pub const CAPABILITIES: &str = "plugin_capabilities";
}

/// Plugin instance pointer returned by `plugin_init`
pub type RawHandle = *mut c_void;

/// `plugin_init(config_json) -> handle` (null handle = failure)
pub type InitFn = unsafe extern "C" fn(config: *const c_char) -> RawHandle;

/// `plugin_start(handle)`
pub type StartFn = unsafe extern "C" fn(handle: RawHandle);

/// `plugin_start(handle, stored_state)`
pub type StartDataFn = unsafe extern "C" fn(handle: RawHandle, stored: *const c_char);

/// `plugin_send(handle, readings_json, len) -> delivered`
///
/// The buffer is borrowed for the duration of the call only.
pub type SendFn = unsafe extern "C" fn(handle: RawHandle, readings: *const u8, len: usize) -> u32;

/// `plugin_config() -> config_json`
pub type ConfigFn = unsafe extern "C" fn() -> *mut c_char;

/// `plugin_shutdown(handle)`
pub type ShutdownFn = unsafe extern "C" fn(handle: RawHandle);

/// `plugin_shutdown(handle) -> persisted_state`
pub type ShutdownDataFn = unsafe extern "C" fn(handle: RawHandle) -> *mut c_char;

/// `plugin_free_string(s)`
pub type FreeStringFn = unsafe extern "C" fn(s: *mut c_char);

/// Capability bits declared through `plugin_capabilities`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);

    /// Plugin resumes from, and hands back, persisted state
    pub const PERSIST_DATA: Self = Self(1);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Encode the init configuration as a C string
pub fn encode_config(config: &ConfigMap) -> Result<CString, ContractError> {
    let json = serde_json::to_string(config)
        .map_err(|e| ContractError::codec(format!("config encode error: {e}")))?;
    CString::new(json).map_err(|e| ContractError::codec(format!("config contains NUL: {e}")))
}

/// Decode a configuration map from JSON
pub fn decode_config(json: &str) -> Result<ConfigMap, ContractError> {
    serde_json::from_str(json)
        .map_err(|e| ContractError::codec(format!("config decode error: {e}")))
}

/// Encode a batch for `plugin_send`
pub fn encode_readings(readings: &ReadingSet) -> Result<Vec<u8>, ContractError> {
    serde_json::to_vec(readings.readings())
        .map_err(|e| ContractError::codec(format!("readings encode error: {e}")))
}

/// Decode a batch received by `plugin_send`
pub fn decode_readings(bytes: &[u8]) -> Result<Vec<Reading>, ContractError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ContractError::codec(format!("readings decode error: {e}")))
}

/// Borrow a C string as UTF-8
///
/// Returns `Ok(None)` for a null pointer.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid for
/// `'a`.
pub unsafe fn read_c_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, ContractError> {
    if ptr.is_null() {
        return Ok(None);
    }
    let raw = unsafe { CStr::from_ptr(ptr) };
    raw.to_str()
        .map(Some)
        .map_err(|e| ContractError::codec(format!("string is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Datapoint, DatapointValue};

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::from_bits(1);
        assert!(caps.contains(Capabilities::PERSIST_DATA));
        assert!(!Capabilities::NONE.contains(Capabilities::PERSIST_DATA));
        assert_eq!(Capabilities::default(), Capabilities::NONE);
    }

    #[test]
    fn test_config_encoding() {
        let mut config = ConfigMap::new();
        config.insert("name".to_string(), "demo".to_string());

        let encoded = encode_config(&config).unwrap();
        let json = unsafe { read_c_str(encoded.as_ptr()) }.unwrap().unwrap();
        assert_eq!(decode_config(json).unwrap(), config);
    }

    #[test]
    fn test_config_nul_is_escaped() {
        let mut config = ConfigMap::new();
        config.insert("key".to_string(), "a\0b".to_string());

        let encoded = encode_config(&config).unwrap();
        let json = unsafe { read_c_str(encoded.as_ptr()) }.unwrap().unwrap();
        assert_eq!(decode_config(json).unwrap()["key"], "a\0b");
    }

    #[test]
    fn test_readings_encoding_preserves_order() {
        let set = ReadingSet::new(vec![
            Reading::new("a", vec![Datapoint::new("x", DatapointValue::Integer(1))]),
            Reading::new("b", vec![Datapoint::new("x", DatapointValue::Integer(2))]),
        ]);
        let bytes = encode_readings(&set).unwrap();
        let decoded = decode_readings(&bytes).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].asset_code(), "a");
        assert_eq!(decoded[1].asset_code(), "b");
    }

    #[test]
    fn test_readings_encoding_keeps_empty_container_types() {
        let set = ReadingSet::new(vec![Reading::new(
            "meta",
            vec![
                Datapoint::new("tags", DatapointValue::Dict(vec![])),
                Datapoint::new("samples", DatapointValue::FloatArray(vec![])),
                Datapoint::new(
                    "pose",
                    DatapointValue::Dict(vec![Datapoint::new("x", DatapointValue::Float(0.5))]),
                ),
            ],
        )]);
        let bytes = encode_readings(&set).unwrap();
        let decoded = decode_readings(&bytes).unwrap();

        assert_eq!(decoded[0].datapoint("tags"), Some(&DatapointValue::Dict(vec![])));
        assert_eq!(
            decoded[0].datapoint("samples"),
            Some(&DatapointValue::FloatArray(vec![]))
        );
        assert_eq!(
            decoded[0].datapoint("pose"),
            Some(&DatapointValue::Dict(vec![Datapoint::new(
                "x",
                DatapointValue::Float(0.5)
            )]))
        );
    }

    #[test]
    fn test_read_null_c_str() {
        let result = unsafe { read_c_str(std::ptr::null()) }.unwrap();
        assert!(result.is_none());
    }
}
