//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "cnpj-delta.toml")]
    pub output: String,

    /// Include every setting with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing cnpj-delta configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your paths", self.output);
                println!("  2. Extract the monthly registry archives into paths.raw_dir");
                println!("  3. Validate configuration: cnpj-delta validate-config");
                println!("  4. Build the structured store: cnpj-delta ingest");
                println!("  5. Publish changes: cnpj-delta export");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5) // Fatal error exit code
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# cnpj-delta Configuration File
# Incremental CNPJ registry ETL

[application]
log_level = "info"
dry_run = false

[paths]
raw_dir = "data/raw"
store_dir = "data/store"
cache_dir = "data/cache"
output_dir = "data/output"
archive_dir = "data/archive"

[ingest]
encoding = "windows-1252"
partition_prefix_len = 2
max_skip_rate = 0.01

[export]
shard_size = 10000
workers = 8
max_retries = 3
retry_backoff_ms = [1000, 2000, 4000]

[verification]
enable_verification = true
sample_size = 10

[logging]
local_enabled = false
local_path = "logs"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# cnpj-delta Configuration File
# Incremental CNPJ registry ETL
#
# Values may reference environment variables with ${VAR_NAME}. Any key can
# also be overridden with CNPJ_DELTA_<SECTION>_<KEY>, for example
# CNPJ_DELTA_EXPORT_WORKERS=16.

[application]
# trace | debug | info | warn | error
log_level = "info"
# Classify and count only; nothing is published and the cache is untouched
dry_run = false

[paths]
# Extracted monthly archives, searched recursively
raw_dir = "data/raw"
# Partitioned structured store, rebuilt by every ingest
store_dir = "data/store"
# Hash cache; keep it between runs or every entity is re-exported
cache_dir = "data/cache"
# Shards land in <output_dir>/<period>/<partition>/<index>.ndjson
output_dir = "${CNPJ_OUTPUT_ROOT}"
# Full archives written by 'cnpj-delta archive', with info.json
archive_dir = "data/archive"

[ingest]
# Primary encoding; rows that fail to decode fall back to UTF-8
encoding = "windows-1252"
# Root characters forming a partition key (1-8); changing it needs a new cache
partition_prefix_len = 2
# Fail the build when more than this fraction of a category's rows is malformed
max_skip_rate = 0.01
# Staged rows per partition between staging commits
commit_interval_rows = 50000

[export]
# Reporting period (YYYY-MM); defaults to the current month
# period = "2025-03"
# Maximum documents plus tombstones per shard
shard_size = 10000
# Partitions exported concurrently
workers = 8
# Records read per store query
page_size = 5000
# Publish retries per shard and backoff between attempts
max_retries = 3
retry_backoff_ms = [1000, 2000, 4000]
dry_run = false

[verification]
# Sample entities after every export
enable_verification = true
sample_size = 10
# Also compare against the published document bytes
compare_published = true
# Fixed seed for reproducible samples
# seed = 42

[logging]
# JSON log files next to the console output
local_enabled = true
local_path = "/var/log/cnpj-delta"
# daily | hourly | never
local_rotation = "daily"
local_max_size_mb = 100
"#
        .to_string()
    }
}
