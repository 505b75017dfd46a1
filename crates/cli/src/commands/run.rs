//! `run` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::NorthServiceConfig;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{load_batches, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let mut service = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref library) = args.library {
        info!(library = %library.display(), "Overriding plugin library from CLI");
        service.plugin.library = library.clone();
    }

    info!(
        service = %service.service.name,
        plugin = %service.plugin.name,
        library = %service.plugin.library.display(),
        queue_capacity = service.delivery.queue_capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&service);
        return Ok(());
    }

    let batches = match &args.input {
        Some(path) => load_batches(path, args.batch_size)?,
        None => {
            warn!("No input file given, the plugin will start and stop without readings");
            Vec::new()
        }
    };

    let pipeline = Pipeline::new(PipelineConfig {
        service,
        batches,
        ingest_buffer: args.ingest_buffer,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    let timeout = if args.timeout == 0 {
        None
    } else {
        Some(Duration::from_secs(args.timeout))
    };

    info!("Starting pipeline...");
    let stats = pipeline
        .run(stop_signal(timeout))
        .await
        .context("Pipeline execution failed")?;

    if let Some(report) = &stats.report {
        info!(
            readings_sent = report.readings_sent,
            readings_unsent = report.readings_unsent,
            state_saved = report.state_saved,
            duration_secs = stats.duration.as_secs_f64(),
            "Pipeline completed successfully"
        );
    }
    stats.print_summary();

    info!("North Bridge finished");
    Ok(())
}

/// Resolves on Ctrl+C, SIGTERM or after `timeout`
async fn stop_signal(timeout: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let deadline = async {
        match timeout {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs(), "Pipeline timed out");
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = deadline => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(service: &NorthServiceConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Service: {}", service.service.name);
    println!("\nPlugin:");
    println!("  Name: {}", service.plugin.name);
    println!("  Library: {}", service.plugin.library.display());

    let mut keys: Vec<_> = service.plugin.config.keys().collect();
    keys.sort();
    for key in keys {
        println!("  {} = {}", key, service.plugin.config[key]);
    }

    let delivery = &service.delivery;
    println!("\nDelivery:");
    println!("  Queue capacity: {}", delivery.queue_capacity);
    println!("  Drop policy: {:?}", delivery.drop_policy);
    println!(
        "  Retries: {} (backoff {} ms)",
        delivery.retry_limit, delivery.retry_backoff_ms
    );

    match &service.state.path {
        Some(path) => println!("\nState: {}", path.display()),
        None => println!("\nState: in memory"),
    }

    println!();
}
