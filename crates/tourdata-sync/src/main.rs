//! tourdata-sync - Main entry point

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tourdata_common::logging::{init_logging, LogConfig, LogLevel, LogOutput, LoggingGuard};
use tourdata_sync::store::PgRecordStore;
use tourdata_sync::{Cli, Commands, RunReport, SourceType, SyncConfig, SyncOrchestrator};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("tourdata-sync")
        .build();

    // Environment variables take precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = setup_logging(&log_config);

    if let Err(e) = execute_command(&cli.command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Install logging; the CLI keeps working without it
fn setup_logging(config: &LogConfig) -> Option<LoggingGuard> {
    match init_logging(config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        },
    }
}

async fn execute_command(command: &Commands) -> Result<()> {
    match command {
        Commands::List => {
            list_sources();
            Ok(())
        },
        Commands::Fetch { .. } => {
            let request = command
                .run_request()
                .context("fetch command without a run request")?;
            let orchestrator = build_orchestrator()?;
            let report = orchestrator.run(&request).await?;
            print_report(&report);
            ensure_success(&report)
        },
        Commands::SyncAll => {
            let orchestrator = build_orchestrator()?;
            let batch = orchestrator.sync_all().await?;
            for report in &batch.reports {
                print_report(report);
            }
            if !batch.success() {
                let failed: Vec<&str> = batch.failed().map(|r| r.api_type).collect();
                bail!("sync failed for: {}", failed.join(", "));
            }
            Ok(())
        },
        Commands::SyncFile { api, path } => {
            let orchestrator = build_orchestrator()?;
            let report = orchestrator.sync_file(*api, Path::new(path)).await?;
            print_report(&report);
            ensure_success(&report)
        },
    }
}

fn build_orchestrator() -> Result<SyncOrchestrator> {
    let config = SyncConfig::load().context("Failed to load configuration")?;
    let store = PgRecordStore::connect_lazy(&config.database)
        .context("Failed to configure database pool")?;
    Ok(SyncOrchestrator::new(config, Arc::new(store))?)
}

fn list_sources() {
    for source in SourceType::ALL {
        println!(
            "{}. {} ({}) -> {}",
            source.menu_key(),
            source.description(),
            source.api_type(),
            source.table_name()
        );
        for endpoint in source.endpoints() {
            let marker = if endpoint.is_listing() { "*" } else { " " };
            println!(
                "   {}{} {:<22} {}",
                marker,
                endpoint.id,
                endpoint.path,
                endpoint.description
            );
        }
    }
    println!();
    println!("* listing endpoint, reconciled into the source table");
}

fn print_report(report: &RunReport) {
    let stats = &report.stats;
    let status = stats.status();
    println!(
        "[{}] {} {}: {} items, {} new, {} updated, {} unchanged, {} failed",
        status,
        report.api_type,
        report.endpoint,
        report.items_fetched,
        stats.new,
        stats.updated,
        stats.unchanged,
        stats.failed
    );
    if let Some(path) = &report.file {
        println!("    file: {}", path.display());
    }
    if let Some(message) = &stats.error_message {
        println!("    error: {}", message);
    }
}

fn ensure_success(report: &RunReport) -> Result<()> {
    if report.success() {
        return Ok(());
    }
    bail!(
        "{} run failed: {}",
        report.api_type,
        report.stats.error_message.as_deref().unwrap_or("unknown error")
    )
}
