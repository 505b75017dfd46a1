//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::NorthServiceConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    service: String,
    plugin: String,
    library: String,
    config_keys: usize,
    queue_capacity: usize,
    drop_policy: String,
    persisted_state: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(service) => {
            let warnings = collect_warnings(&service);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", service.version),
                    service: service.service.name.clone(),
                    plugin: service.plugin.name.clone(),
                    library: service.plugin.library.display().to_string(),
                    config_keys: service.plugin.config.len(),
                    queue_capacity: service.delivery.queue_capacity,
                    drop_policy: format!("{:?}", service.delivery.drop_policy),
                    persisted_state: service.state.path.is_some(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(service: &NorthServiceConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !service.plugin.library.exists() {
        warnings.push(format!(
            "Plugin library {} does not exist yet",
            service.plugin.library.display()
        ));
    }

    if service.state.path.is_none() {
        warnings.push("state.path is not set - persisted state is lost on exit".to_string());
    }

    if service.delivery.retry_limit == 0 {
        warnings.push("delivery.retry_limit is 0 - undelivered readings are dropped".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Service: {}", summary.service);
            println!("  Plugin: {} ({})", summary.plugin, summary.library);
            println!("  Config keys: {}", summary.config_keys);
            println!(
                "  Queue: {} ({})",
                summary.queue_capacity, summary.drop_policy
            );
            println!("  Persisted state: {}", summary.persisted_state);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let (_file, args) = args_for(
            "[service]\nname = \"demo\"\n\n[plugin]\nname = \"file\"\nlibrary = \"/nonexistent/libnorth_file.so\"\n",
        );
        let result = validate_config(&args);

        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("does not exist")));
        assert!(warnings.iter().any(|w| w.contains("state.path")));
        assert_eq!(result.summary.unwrap().plugin, "file");
    }

    #[test]
    fn test_invalid_config() {
        let (_file, args) = args_for("[service]\nname = \"\"\n\n[plugin]\nname = \"file\"\nlibrary = \"x.so\"\n");
        let result = validate_config(&args);

        assert!(!result.valid);
        assert!(result.error.unwrap().contains("service name must not be empty"));
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: "/nonexistent/north.toml".into(),
            json: false,
        };
        assert!(!validate_config(&args).valid);
    }
}
