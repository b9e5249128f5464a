//! Single-entity export command
//!
//! Writes one canonical document without touching the hash cache. Useful for
//! inspecting what the export would publish for a given registry number.

use super::exit_code_for;
use crate::config::load_config;
use crate::core::export::ExportCoordinator;
use crate::domain::Cnpj;
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

/// Arguments for the single command
#[derive(Args, Debug)]
pub struct SingleArgs {
    /// Registry number, masked or unmasked
    #[arg(long)]
    pub cnpj: String,

    /// Directory the document is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
}

impl SingleArgs {
    /// Execute the single command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let cnpj = match Cnpj::new(&self.cnpj) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Invalid CNPJ: {e}");
                return Ok(2);
            }
        };
        tracing::info!(cnpj = %cnpj, "Starting single export");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = match ExportCoordinator::new(config, shutdown_rx) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to open structured store: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        match coordinator.export_single(&cnpj, &self.output).await {
            Ok(Some(path)) => {
                println!("✅ Document written: {}", path.display());
                Ok(0)
            }
            Ok(None) => {
                println!("❌ CNPJ {cnpj} not found in the structured store");
                Ok(1)
            }
            Err(e) => {
                tracing::error!(cnpj = %cnpj, error = %e, "Single export failed");
                eprintln!("Single export failed: {e}");
                Ok(exit_code_for(&e))
            }
        }
    }
}
