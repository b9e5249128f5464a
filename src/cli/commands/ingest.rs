//! Ingest command implementation
//!
//! Builds the structured store from the raw extracts in `paths.raw_dir`.

use super::exit_code_for;
use crate::config::{load_config, DeltaConfig};
use crate::core::ingest::{IngestSummary, StoreBuilder};
use crate::log_error_with_context;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Override the raw extract directory
    #[arg(long)]
    pub raw_dir: Option<PathBuf>,
}

impl IngestArgs {
    /// Execute the ingest command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting ingest command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        if let Some(raw_dir) = &self.raw_dir {
            tracing::info!(raw_dir = %raw_dir.display(), "Overriding raw directory from CLI");
            config.paths.raw_dir = raw_dir.clone();
        }

        Ok(run_ingest(&config).await)
    }
}

/// Builds the store and prints the summary; returns the exit code
pub(crate) async fn run_ingest(config: &DeltaConfig) -> i32 {
    println!(
        "📥 Building structured store from {}...",
        config.paths.raw_dir.display()
    );
    println!();

    match StoreBuilder::new(config).build().await {
        Ok(summary) => {
            print_summary(&summary);
            0
        }
        Err(e) => {
            log_error_with_context!(&e, "Ingestion failed");
            println!("❌ Ingestion failed, the previous store (if any) is unchanged");
            println!("   Error: {e}");
            exit_code_for(&e)
        }
    }
}

fn print_summary(summary: &IngestSummary) {
    println!("📊 Ingest Summary:");
    println!(
        "  {:<22} {:>6} {:>12} {:>10} {:>10}",
        "Category", "Files", "Rows", "Skipped", "Fallback"
    );
    for (category, stats) in &summary.categories {
        println!(
            "  {:<22} {:>6} {:>12} {:>10} {:>10}",
            category.name(),
            stats.files,
            stats.total_rows,
            stats.skipped_rows,
            stats.fallback_decoded_rows
        );
    }
    println!();
    println!("  Partitions: {}", summary.partitions);
    println!("  Records: {}", summary.records);
    if summary.orphan_establishments > 0 {
        println!(
            "  Establishments without company: {}",
            summary.orphan_establishments
        );
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();
    println!("✅ Structured store built (build {})", summary.build_id);
}
