//! Export command implementation
//!
//! This module implements the `export` command: change detection against the
//! hash cache and publication of the changed documents as shards.

use super::exit_code_for;
use crate::config::{load_config, DeltaConfig};
use crate::core::export::{ExportCoordinator, ExportSummary};
use crate::log_error_with_context;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run mode - classify and count without publishing or committing
    #[arg(long)]
    pub dry_run: bool,

    /// Override the reporting period (YYYY-MM)
    #[arg(long)]
    pub period: Option<String>,
}

impl ExportArgs {
    /// Apply CLI overrides onto a loaded configuration
    pub fn apply_overrides(&self, config: &mut DeltaConfig) {
        if let Some(period) = &self.period {
            tracing::info!(period = %period, "Overriding export period from CLI");
            config.export.period = Some(period.clone());
        }

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.export.dry_run = true;
        }
    }

    /// Execute the export command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting export command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2); // Configuration error exit code
        }

        if config.is_dry_run() {
            tracing::info!("Dry run mode enabled - nothing will be published");
            println!("🔍 DRY RUN MODE - No shards will be published and the hash cache is left untouched");
            println!();
        }

        if !self.yes && !config.is_dry_run() {
            println!("Export Configuration:");
            println!(
                "  Period: {}",
                config.export.period.as_deref().unwrap_or("current month")
            );
            println!("  Store: {}", config.paths.store_dir.display());
            println!("  Cache: {}", config.paths.cache_dir.display());
            println!("  Output: {}", config.paths.output_dir.display());
            println!("  Shard size: {}", config.export.shard_size);
            println!("  Workers: {}", config.export.workers);
            println!();
            print!("Proceed with export? [y/N]: ");
            use std::io::{self, Write};
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Export cancelled.");
                return Ok(0);
            }
        }

        run_export(config, shutdown_signal).await
    }
}

/// Runs an export with a validated configuration and prints its summary
pub(crate) async fn run_export(
    config: DeltaConfig,
    shutdown_signal: watch::Receiver<bool>,
) -> anyhow::Result<i32> {
    tracing::info!("Creating export coordinator");
    let coordinator = match ExportCoordinator::new(config, shutdown_signal) {
        Ok(c) => c,
        Err(e) => {
            log_error_with_context!(&e, "Failed to create export coordinator");
            eprintln!("Failed to initialize export: {e}");
            return Ok(exit_code_for(&e));
        }
    };

    println!("🚀 Starting export for period {}...", coordinator.period());
    println!();

    let summary = match coordinator.execute_export().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            eprintln!("Export failed: {e}");
            return Ok(exit_code_for(&e));
        }
    };

    print_summary(&summary);
    Ok(summary_exit_code(&summary))
}

/// 130 when interrupted, 1 on partial failure, 0 otherwise
pub(crate) fn summary_exit_code(summary: &ExportSummary) -> i32 {
    if summary.interrupted {
        130
    } else if !summary.is_successful() {
        1
    } else {
        0
    }
}

fn print_summary(summary: &ExportSummary) {
    println!();
    println!("📊 Export Summary ({}):", summary.period);
    println!("  Partitions: {}", summary.partitions_processed);
    if summary.partitions_failed > 0 {
        println!("  Partitions Failed: {}", summary.partitions_failed);
    }
    if summary.cache_fallbacks > 0 {
        println!("  Cache Fallbacks: {}", summary.cache_fallbacks);
    }
    println!("  Scanned: {}", summary.scanned);
    println!("  Unchanged: {}", summary.unchanged);
    println!("  New: {}", summary.new);
    println!("  Modified: {}", summary.modified);
    println!("  Removed: {}", summary.removed);
    if summary.dry_run {
        println!("  Planned Shards: {}", summary.shards_published);
    } else {
        println!("  Shards Published: {}", summary.shards_published);
        println!("  Documents Published: {}", summary.documents_published);
        println!("  Tombstones Published: {}", summary.tombstones_published);
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    if let Some(report) = &summary.verification_report {
        println!("{}", report.format_summary());
        println!();
    }

    if !summary.errors.is_empty() {
        println!("⚠️  Errors ({}):", summary.errors.len());
        for (i, error) in summary.errors.iter().enumerate() {
            if i < 10 {
                match &error.context {
                    Some(context) => println!("  - [{context}] {}", error.message),
                    None => println!("  - {}", error.message),
                }
            }
        }
        if summary.errors.len() > 10 {
            println!("  ... and {} more errors", summary.errors.len() - 10);
        }
        println!();
    }

    if summary.interrupted {
        println!("⚠️  Export interrupted. Committed shards are kept; re-run to resume.");
    } else if summary.is_successful() {
        println!("✅ Export completed successfully");
    } else {
        println!("❌ Export completed with errors");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::PartitionResult;
    use crate::domain::{DeltaError, PartitionKey};

    #[test]
    fn test_apply_overrides() {
        let args = ExportArgs {
            yes: true,
            dry_run: true,
            period: Some("2024-11".to_string()),
        };
        let mut config = DeltaConfig::default();
        args.apply_overrides(&mut config);

        assert!(config.is_dry_run());
        assert_eq!(config.export.period.as_deref(), Some("2024-11"));
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let args = ExportArgs {
            yes: false,
            dry_run: false,
            period: None,
        };
        let mut config = DeltaConfig::default();
        config.export.period = Some("2025-01".to_string());
        args.apply_overrides(&mut config);

        assert!(!config.is_dry_run());
        assert_eq!(config.export.period.as_deref(), Some("2025-01"));
    }

    #[test]
    fn test_summary_exit_codes() {
        let ok = ExportSummary::new("2025-05", false);
        assert_eq!(summary_exit_code(&ok), 0);

        let mut partial = ExportSummary::new("2025-05", false);
        partial.add_partition_failure(
            &PartitionKey::new("11").unwrap(),
            &DeltaError::Upload("timeout".to_string()),
        );
        assert_eq!(summary_exit_code(&partial), 1);

        let mut interrupted = ExportSummary::new("2025-05", false);
        let mut result = PartitionResult::new(PartitionKey::new("22").unwrap());
        result.interrupted = true;
        interrupted.add_partition(&result);
        assert_eq!(summary_exit_code(&interrupted), 130);
    }
}
