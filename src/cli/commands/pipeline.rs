//! Pipeline command implementation
//!
//! Runs ingest and export back to back. Verification follows the export
//! when `verification.enable_verification` is set.

use super::export::{run_export, ExportArgs};
use super::ingest::run_ingest;
use crate::config::load_config;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the pipeline command
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Export options
    #[command(flatten)]
    pub export: ExportArgs,
}

impl PipelineArgs {
    /// Execute the pipeline command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting pipeline command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        self.export.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let code = run_ingest(&config).await;
        if code != 0 {
            return Ok(code);
        }

        if *shutdown_signal.borrow() {
            println!("⚠️  Shutdown requested after ingest, export skipped");
            return Ok(130);
        }

        println!();
        run_export(config, shutdown_signal).await
    }
}
