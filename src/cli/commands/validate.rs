//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the cnpj-delta configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates before returning
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let period = match config.period() {
            Ok(p) => p.to_string(),
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.is_dry_run());
        println!("  Raw Extracts: {}", config.paths.raw_dir.display());
        println!("  Structured Store: {}", config.paths.store_dir.display());
        println!("  Hash Cache: {}", config.paths.cache_dir.display());
        println!("  Output: {}", config.paths.output_dir.display());
        println!("  Encoding: {}", config.ingest.encoding);
        println!(
            "  Partition Prefix Length: {}",
            config.ingest.partition_prefix_len
        );
        println!(
            "  Max Skip Rate: {:.2}%",
            config.ingest.max_skip_rate * 100.0
        );
        println!("  Period: {period}");
        println!("  Shard Size: {}", config.export.shard_size);
        println!("  Workers: {}", config.export.workers);
        println!(
            "  Verification: {}",
            if config.verification.enable_verification {
                format!("{} samples", config.verification.sample_size)
            } else {
                "disabled".to_string()
            }
        );
        println!();
        Ok(0)
    }
}
