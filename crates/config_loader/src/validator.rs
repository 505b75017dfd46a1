//! Configuration validation
//!
//! Rules:
//! - field rules declared on the config types (`validator` derive)
//! - plugin library path is set
//! - plugin config keys are non-empty
//! - retry backoff stays within one minute
//! - state path, when given, is non-empty

use ::validator::{Validate, ValidationErrors};
use contracts::{ContractError, NorthServiceConfig};

/// Longest accepted pause between retries
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Validate a NorthServiceConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &NorthServiceConfig) -> Result<(), ContractError> {
    config.validate().map_err(to_contract_error)?;
    validate_plugin(config)?;
    validate_delivery(config)?;
    validate_state(config)?;
    Ok(())
}

fn to_contract_error(errors: ValidationErrors) -> ContractError {
    let message = errors.to_string();
    let field = message
        .split(':')
        .next()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or("config")
        .to_string();
    ContractError::config_validation(field, message)
}

/// Validate plugin selection
fn validate_plugin(config: &NorthServiceConfig) -> Result<(), ContractError> {
    let plugin = &config.plugin;

    if plugin.library.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "plugin.library",
            "plugin library path cannot be empty",
        ));
    }

    if plugin.config.keys().any(String::is_empty) {
        return Err(ContractError::config_validation(
            format!("plugin[{}].config", plugin.name),
            "plugin config keys cannot be empty",
        ));
    }
    Ok(())
}

/// Validate delivery policy
fn validate_delivery(config: &NorthServiceConfig) -> Result<(), ContractError> {
    let delivery = &config.delivery;

    if delivery.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
        return Err(ContractError::config_validation(
            "delivery.retry_backoff_ms",
            format!(
                "retry_backoff_ms must be <= {MAX_RETRY_BACKOFF_MS}, got {}",
                delivery.retry_backoff_ms
            ),
        ));
    }
    Ok(())
}

/// Validate persisted state location
fn validate_state(config: &NorthServiceConfig) -> Result<(), ContractError> {
    if let Some(path) = &config.state.path {
        if path.as_os_str().is_empty() {
            return Err(ContractError::config_validation(
                "state.path",
                "state path cannot be empty",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigMap, ConfigVersion, DeliveryConfig, PluginConfig, ServiceConfig, StateConfig,
    };
    use std::path::PathBuf;

    fn minimal_config() -> NorthServiceConfig {
        NorthServiceConfig {
            version: ConfigVersion::V1,
            service: ServiceConfig {
                name: "north_demo".into(),
            },
            plugin: PluginConfig {
                name: "file".into(),
                library: PathBuf::from("libnorth_file.so"),
                config: ConfigMap::from([("path".to_string(), "out.jsonl".to_string())]),
            },
            delivery: DeliveryConfig::default(),
            state: StateConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = minimal_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_service_name() {
        let mut config = minimal_config();
        config.service.name = String::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("service name must not be empty"), "got: {err}");
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut config = minimal_config();
        config.delivery.queue_capacity = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("queue_capacity"), "got: {err}");
    }

    #[test]
    fn test_empty_library() {
        let mut config = minimal_config();
        config.plugin.library = PathBuf::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("library path cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_empty_config_key() {
        let mut config = minimal_config();
        config.plugin.config.insert(String::new(), "x".into());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("keys cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_backoff_too_long() {
        let mut config = minimal_config();
        config.delivery.retry_backoff_ms = 120_000;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("retry_backoff_ms must be <="), "got: {err}");
    }

    #[test]
    fn test_empty_state_path() {
        let mut config = minimal_config();
        config.state.path = Some(PathBuf::new());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("state path cannot be empty"), "got: {err}");
    }
}
