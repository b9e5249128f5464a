//! Verify command implementation
//!
//! Runs the integrity sampler on its own, outside an export.

use super::exit_code_for;
use crate::config::load_config;
use crate::core::export::ExportCoordinator;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the verify command
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Override the number of sampled identifiers
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Fixed seed for a reproducible sample
    #[arg(long)]
    pub seed: Option<u64>,
}

impl VerifyArgs {
    /// Execute the verify command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting verify command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        if let Some(size) = self.sample_size {
            if size == 0 {
                eprintln!("--sample-size must be > 0");
                return Ok(2);
            }
            config.verification.sample_size = size;
        }
        if self.seed.is_some() {
            config.verification.seed = self.seed;
        }

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = match ExportCoordinator::new(config, shutdown_rx) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to open store or cache: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!("🔍 Sampling entities against store, cache and published output...");
        println!();

        let report = match coordinator.verify().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Verification failed");
                eprintln!("Verification failed: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!("{}", report.format_summary());

        Ok(if report.is_success() { 0 } else { 1 })
    }
}
