//! Archive command implementation
//!
//! Writes every canonical document of the structured store into one
//! compressed archive, with an `info.json` describing it. The hash cache is
//! neither read nor updated.

use super::exit_code_for;
use crate::config::load_config;
use crate::core::archive::{archive_path, ArchiveExporter, ArchiveInfo};
use crate::core::store::StructuredStore;
use crate::log_error_with_context;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the archive command
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Directory for the archive and info.json (defaults to paths.archive_dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ArchiveArgs {
    /// Execute the archive command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting archive command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        let dir = self
            .output
            .clone()
            .unwrap_or_else(|| config.paths.archive_dir.clone());

        let store = match StructuredStore::open(&config.paths.store_dir) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                eprintln!("Failed to open structured store: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!("📦 Archiving {} records...", store.manifest().total_records());
        let exporter = ArchiveExporter::new(store, config.export.page_size, shutdown_signal);
        match exporter.export(&dir).await {
            Ok(Some(info)) => {
                print_info(&dir, &info);
                Ok(0)
            }
            Ok(None) => {
                println!("⚠️  Archive interrupted; nothing was written");
                Ok(130)
            }
            Err(e) => {
                log_error_with_context!(&e, "Archive failed");
                eprintln!("Archive failed: {e}");
                Ok(exit_code_for(&e))
            }
        }
    }
}

fn print_info(dir: &Path, info: &ArchiveInfo) {
    println!();
    println!("✅ Archive written: {}", archive_path(dir, info).display());
    println!("  Documents: {}", info.total);
    println!("  Size: {} bytes", info.archive_size);
    println!("  SHA-256: {}", info.archive_sha256);
    println!(
        "  Store built at: {}",
        info.last_updated.format("%Y-%m-%d %H:%M:%S")
    );
}
