//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{ConfigMap, NorthServiceConfig};
use plugin_host::{NorthPlugin, PluginRegistry};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    service: String,
    plugin: PluginInfo,
    delivery: DeliveryInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_points: Option<EntryPointInfo>,
}

#[derive(Serialize)]
struct PluginInfo {
    name: String,
    library: String,
    config: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct DeliveryInfo {
    queue_capacity: usize,
    drop_policy: String,
    retry_limit: u32,
    retry_backoff_ms: u64,
}

/// What the loaded library exports
#[derive(Serialize)]
struct EntryPointInfo {
    abi_version: u32,
    persists_data: bool,
    slots: BTreeMap<&'static str, bool>,
    default_config: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let service = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let entry_points = if args.plugin {
        Some(inspect_plugin(&service)?)
    } else {
        None
    };

    let info = build_config_info(&service, entry_points);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Load the library and query its entry points without creating an instance
fn inspect_plugin(service: &NorthServiceConfig) -> Result<EntryPointInfo> {
    let mut registry = PluginRegistry::new();
    let table = registry
        .load(&service.plugin.name, &service.plugin.library)
        .with_context(|| {
            format!(
                "Failed to load plugin library {}",
                service.plugin.library.display()
            )
        })?;

    let plugin = NorthPlugin::new(table.clone());
    let defaults = plugin
        .config()
        .context("Failed to read plugin default configuration")?;

    Ok(EntryPointInfo {
        abi_version: table.abi_version(),
        persists_data: table.persists_data(),
        slots: table.bound_slots().into_iter().collect(),
        default_config: sorted(&defaults),
    })
}

fn sorted(config: &ConfigMap) -> BTreeMap<String, String> {
    config
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn build_config_info(
    service: &NorthServiceConfig,
    entry_points: Option<EntryPointInfo>,
) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", service.version),
        service: service.service.name.clone(),
        plugin: PluginInfo {
            name: service.plugin.name.clone(),
            library: service.plugin.library.display().to_string(),
            config: sorted(&service.plugin.config),
        },
        delivery: DeliveryInfo {
            queue_capacity: service.delivery.queue_capacity,
            drop_policy: format!("{:?}", service.delivery.drop_policy),
            retry_limit: service.delivery.retry_limit,
            retry_backoff_ms: service.delivery.retry_backoff_ms,
        },
        state_path: service
            .state
            .path
            .as_ref()
            .map(|p| p.display().to_string()),
        entry_points,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== North Bridge Configuration ===\n");

    println!("Service");
    println!("   ├─ Version: {}", info.version);
    println!("   └─ Name: {}", info.service);

    println!("\nPlugin");
    println!("   ├─ Name: {}", info.plugin.name);
    println!("   ├─ Library: {}", info.plugin.library);
    print_map("   └─ Config", &info.plugin.config);

    println!("\nDelivery");
    println!("   ├─ Queue capacity: {}", info.delivery.queue_capacity);
    println!("   ├─ Drop policy: {}", info.delivery.drop_policy);
    println!(
        "   └─ Retries: {} (backoff {} ms)",
        info.delivery.retry_limit, info.delivery.retry_backoff_ms
    );

    println!(
        "\nState: {}",
        info.state_path.as_deref().unwrap_or("in memory")
    );

    if let Some(entry_points) = &info.entry_points {
        println!("\nEntry points");
        println!("   ├─ ABI version: {}", entry_points.abi_version);
        println!("   ├─ Persists data: {}", entry_points.persists_data);
        for (slot, bound) in &entry_points.slots {
            println!(
                "   ├─ {}: {}",
                slot,
                if *bound { "bound" } else { "unavailable" }
            );
        }
        print_map("   └─ Defaults", &entry_points.default_config);
    }

    println!();
}

fn print_map(label: &str, map: &BTreeMap<String, String>) {
    if map.is_empty() {
        println!("{label}: (empty)");
        return;
    }
    println!("{label}:");
    for (key, value) in map {
        println!("         {key} = {value}");
    }
}
