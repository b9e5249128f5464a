//! Configuration schema types
//!
//! Every section is optional in the TOML file; omitted keys fall back to the
//! `default_*` functions at the bottom of this module.

use crate::domain::ids::{Period, ROOT_LEN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main cnpj-delta configuration
///
/// Built once at startup and passed by reference into the builder, the
/// exporter and the sampler. There is no global configuration state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Raw extract ingestion
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Change detection and shard publishing
    #[serde(default)]
    pub export: ExportConfig,

    /// Post-export integrity sampling
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DeltaConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.paths.validate()?;
        self.ingest.validate()?;
        self.export.validate()?;
        self.verification.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Period the export publishes under, defaulting to the current month
    pub fn period(&self) -> Result<Period, String> {
        match &self.export.period {
            Some(period) => Period::new(period.clone()),
            None => Ok(Period::current()),
        }
    }

    /// Whether writes to the sink and cache are suppressed
    pub fn is_dry_run(&self) -> bool {
        self.application.dry_run || self.export.dry_run
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (classify only, publish and commit nothing)
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Filesystem locations of every artifact the pipeline reads or writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the extracted raw files (searched recursively)
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    /// Partitioned structured store
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Hash cache databases
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Root of the local shard destination
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Full document archives and their `info.json`
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            store_dir: default_store_dir(),
            cache_dir: default_cache_dir(),
            output_dir: default_output_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

impl PathsConfig {
    fn validate(&self) -> Result<(), String> {
        let paths = [
            ("paths.raw_dir", &self.raw_dir),
            ("paths.store_dir", &self.store_dir),
            ("paths.cache_dir", &self.cache_dir),
            ("paths.output_dir", &self.output_dir),
            ("paths.archive_dir", &self.archive_dir),
        ];
        for (name, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(format!("{name} cannot be empty"));
            }
        }
        if self.store_dir == self.cache_dir {
            return Err("paths.store_dir and paths.cache_dir must differ".to_string());
        }
        Ok(())
    }
}

/// Raw extract ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Primary text encoding of the extracts (WHATWG label)
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Number of root characters forming the partition key
    #[serde(default = "default_partition_prefix_len")]
    pub partition_prefix_len: usize,

    /// Fraction of malformed rows per category above which ingestion fails
    #[serde(default = "default_max_skip_rate")]
    pub max_skip_rate: f64,

    /// Staged rows per partition between staging transaction commits
    #[serde(default = "default_commit_interval_rows")]
    pub commit_interval_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            partition_prefix_len: default_partition_prefix_len(),
            max_skip_rate: default_max_skip_rate(),
            commit_interval_rows: default_commit_interval_rows(),
        }
    }
}

impl IngestConfig {
    fn validate(&self) -> Result<(), String> {
        if encoding_rs::Encoding::for_label(self.encoding.as_bytes()).is_none() {
            return Err(format!("Unknown ingest.encoding '{}'", self.encoding));
        }

        if self.partition_prefix_len == 0 || self.partition_prefix_len > ROOT_LEN {
            return Err(format!(
                "ingest.partition_prefix_len must be between 1 and {ROOT_LEN}, got {}",
                self.partition_prefix_len
            ));
        }

        if !(0.0..=1.0).contains(&self.max_skip_rate) {
            return Err(format!(
                "ingest.max_skip_rate must be between 0.0 and 1.0, got {}",
                self.max_skip_rate
            ));
        }

        if self.commit_interval_rows == 0 {
            return Err("ingest.commit_interval_rows must be > 0".to_string());
        }

        Ok(())
    }
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Reporting period (`YYYY-MM`); the current month when omitted
    #[serde(default)]
    pub period: Option<String>,

    /// Maximum documents (or tombstones) per shard
    #[serde(default = "default_shard_size")]
    pub shard_size: usize,

    /// Partitions processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Records fetched per structured store query
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum publish retry attempts per shard
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Retry backoff intervals in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,

    /// Dry run mode - classify and count without publishing or committing
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            period: None,
            shard_size: default_shard_size(),
            workers: default_workers(),
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            dry_run: false,
        }
    }
}

impl ExportConfig {
    fn validate(&self) -> Result<(), String> {
        if let Some(period) = &self.period {
            Period::new(period.clone()).map_err(|e| format!("export.period: {e}"))?;
        }

        if self.shard_size == 0 {
            return Err("export.shard_size must be > 0".to_string());
        }

        if self.workers == 0 || self.workers > 256 {
            return Err(format!(
                "export.workers must be between 1 and 256, got {}",
                self.workers
            ));
        }

        if self.page_size == 0 {
            return Err("export.page_size must be > 0".to_string());
        }

        if self.max_retries > 10 {
            return Err(format!(
                "export.max_retries must be <= 10, got {}",
                self.max_retries
            ));
        }

        Ok(())
    }
}

/// Integrity sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Run the sampler after every export
    #[serde(default = "default_true")]
    pub enable_verification: bool,

    /// Number of random identifiers checked
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Also compare against the published document when the sink can serve it
    #[serde(default = "default_true")]
    pub compare_published: bool,

    /// Fixed RNG seed for reproducible samples
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enable_verification: true,
            sample_size: default_sample_size(),
            compare_published: true,
            seed: None,
        }
    }
}

impl VerificationConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enable_verification && self.sample_size == 0 {
            return Err("verification.sample_size must be > 0 when enabled".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log file path
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Maximum log file size in MB
    #[serde(default = "default_local_max_size_mb")]
    pub local_max_size_mb: usize,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_max_size_mb == 0 {
            return Err("logging.local_max_size_mb must be > 0".to_string());
        }

        Ok(())
    }

    /// Console-only logging, used before a configuration file is loaded
    pub fn console_only() -> Self {
        Self {
            local_enabled: false,
            ..Self::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            local_max_size_mb: default_local_max_size_mb(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/store")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/output")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("data/archive")
}

fn default_encoding() -> String {
    "windows-1252".to_string()
}

fn default_partition_prefix_len() -> usize {
    2
}

fn default_max_skip_rate() -> f64 {
    0.01
}

fn default_commit_interval_rows() -> usize {
    50_000
}

fn default_shard_size() -> usize {
    10_000
}

fn default_workers() -> usize {
    8
}

fn default_page_size() -> usize {
    5_000
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> Vec<u64> {
    vec![1000, 2000, 4000]
}

fn default_sample_size() -> usize {
    10
}

fn default_local_path() -> String {
    "/var/log/cnpj-delta".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_local_max_size_mb() -> usize {
    100
}
