//! Status command implementation
//!
//! This module implements the `status` command for displaying the structured
//! store manifest, hash cache counts and the committed shard log.

use crate::config::load_config;
use crate::core::state::{HashCache, ShardLogEntry};
use crate::core::store::StructuredStore;
use crate::domain::Period;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only list shards of this period (YYYY-MM)
    #[arg(long)]
    pub period: Option<String>,

    /// Maximum shard log rows printed
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking pipeline status");

        println!("📊 Pipeline Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {}", e);
                return Ok(2); // Configuration error exit code
            }
        };

        let period = match self.period.as_deref().map(Period::new).transpose() {
            Ok(p) => p,
            Err(e) => {
                println!("❌ Invalid --period: {e}");
                return Ok(2);
            }
        };

        let mut prefix_len = config.ingest.partition_prefix_len;
        match StructuredStore::open(&config.paths.store_dir) {
            Ok(store) => {
                let manifest = store.manifest();
                prefix_len = store.prefix_len();
                println!("Structured store: {}", config.paths.store_dir.display());
                println!("  Build: {}", manifest.build_id);
                println!(
                    "  Built at: {}",
                    manifest.built_at.format("%Y-%m-%d %H:%M:%S")
                );
                println!("  Partition prefix: {}", manifest.partition_prefix_len);
                println!("  Partitions: {}", manifest.partitions.len());
                println!("  Records: {}", manifest.total_records());
                if manifest.orphan_establishments > 0 {
                    println!(
                        "  Establishments without company: {}",
                        manifest.orphan_establishments
                    );
                }
            }
            Err(e) => {
                println!("Structured store: not built");
                println!("   {e}");
                println!("Run 'cnpj-delta ingest' to build it.");
            }
        }
        println!();

        if !config.paths.cache_dir.exists() {
            println!("Hash cache: empty");
            println!("Run 'cnpj-delta export' to publish the first shards.");
            return Ok(0);
        }

        let cache = match HashCache::open(&config.paths.cache_dir, prefix_len) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to open hash cache");
                println!("   Error: {}", e);
                return Ok(2);
            }
        };

        let stats = match cache.stats().await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to read hash cache");
                println!("   Error: {}", e);
                return Ok(5); // Fatal error exit code
            }
        };
        println!("Hash cache: {}", config.paths.cache_dir.display());
        println!("  Partitions: {}", stats.partitions);
        println!("  Live entries: {}", stats.live);
        println!("  Tombstoned entries: {}", stats.tombstoned);
        println!();

        let mut shards: Vec<ShardLogEntry> = Vec::new();
        for key in cache.partitions()? {
            match cache.shard_log(&key, period.as_ref()).await {
                Ok(entries) => shards.extend(entries),
                Err(e) => {
                    println!("❌ Failed to read shard log of partition {key}");
                    println!("   Error: {}", e);
                    return Ok(5);
                }
            }
        }

        if shards.is_empty() {
            println!("No committed shards found.");
            return Ok(0);
        }

        shards.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
        println!(
            "Found {} committed shard(s), most recent first:",
            shards.len()
        );
        println!();
        println!(
            "{:<24} {:>10} {:>11} {:<20} {:<16}",
            "Shard", "Documents", "Tombstones", "Committed", "Checksum"
        );
        println!("{}", "-".repeat(86));
        for shard in shards.iter().take(self.limit) {
            println!(
                "{:<24} {:>10} {:>11} {:<20} {:<16}",
                shard.key,
                shard.document_count,
                shard.tombstone_count,
                shard.committed_at.format("%Y-%m-%d %H:%M:%S"),
                &shard.checksum[..shard.checksum.len().min(16)]
            );
        }
        if shards.len() > self.limit {
            println!("... and {} more", shards.len() - self.limit);
        }

        println!();
        Ok(0)
    }
}
