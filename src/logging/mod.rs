//! Logging and observability
//!
//! Structured logging built on `tracing`:
//! - console output with configurable level
//! - optional JSON file logging with rotation
//! - macros that keep field names consistent across the pipeline stages
//!
//! # Example
//!
//! ```no_run
//! use cnpj_delta::logging::init_logging;
//! use cnpj_delta::config::LoggingConfig;
//!
//! let config = LoggingConfig::console_only();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(partition = "33", "Partition started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a shard that was durably published and committed
///
/// # Example
///
/// ```no_run
/// use cnpj_delta::log_shard_published;
///
/// log_shard_published!("2025-03/33/00000", 10_000, 12);
/// ```
#[macro_export]
macro_rules! log_shard_published {
    ($key:expr, $documents:expr, $tombstones:expr) => {{
        tracing::info!(
            shard = %$key,
            documents = $documents,
            tombstones = $tombstones,
            "Shard published and committed"
        );
    }};
}

/// Log the end of one partition's export
#[macro_export]
macro_rules! log_partition_complete {
    ($partition:expr, $result:expr) => {{
        tracing::info!(
            partition = %$partition,
            scanned = $result.scanned,
            unchanged = $result.unchanged,
            new = $result.new,
            modified = $result.modified,
            removed = $result.removed,
            shards = $result.shards_published,
            cache_fallback = $result.cache_fallback,
            "Partition export finished"
        );
    }};
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use cnpj_delta::log_error_with_context;
/// use cnpj_delta::domain::DeltaError;
///
/// let error = DeltaError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {{
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    }};
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use cnpj_delta::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {{
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    }};
}
