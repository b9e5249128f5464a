//! Configuration management for cnpj-delta.
//!
//! TOML configuration with:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `CNPJ_DELTA_<SECTION>_<KEY>` environment overrides
//! - Default values for every setting
//! - Validation on load
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level, dry run
//! - [`PathsConfig`] - raw extracts, store, cache and output locations
//! - [`IngestConfig`] - encoding, partition prefix, malformed-row threshold
//! - [`ExportConfig`] - period, shard size, workers, retries
//! - [`VerificationConfig`] - integrity sampling
//! - [`LoggingConfig`] - local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [paths]
//! raw_dir = "/srv/cnpj/raw/2025-03"
//! store_dir = "/srv/cnpj/store"
//! cache_dir = "/srv/cnpj/cache"
//! output_dir = "${CNPJ_OUTPUT_ROOT}"
//!
//! [ingest]
//! partition_prefix_len = 2
//! max_skip_rate = 0.01
//!
//! [export]
//! shard_size = 10000
//! workers = 8
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, DeltaConfig, ExportConfig, IngestConfig, LoggingConfig, PathsConfig,
    VerificationConfig,
};
