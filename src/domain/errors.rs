//! Domain error types
//!
//! This module defines the error hierarchy for cnpj-delta. All errors are
//! domain-specific and carry rendered messages instead of third-party types,
//! so callers never need to depend on SQLite, CSV or TOML crates directly.

use thiserror::Error;

/// Main cnpj-delta error type
///
/// This is the primary error type used throughout the library.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fatal ingestion errors. A run that hits one of these leaves no store behind.
    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// Structured store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Hash cache errors
    #[error("Hash cache error: {0}")]
    Cache(String),

    /// Embedded database errors not yet attributed to the store or the cache
    #[error("Database error: {0}")]
    Database(String),

    /// Export process errors
    #[error("Export error: {0}")]
    Export(String),

    /// Shard destination errors (after retries were exhausted)
    #[error("Upload error: {0}")]
    Upload(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Fatal causes raised by the structured store builder
#[derive(Debug, Error)]
pub enum IngestionError {
    /// No file matched a required source category
    #[error("Missing required source category: {0}")]
    MissingCategory(String),

    /// Files were found but yielded no valid row
    #[error("Source category '{0}' is empty")]
    EmptyCategory(String),

    /// Too many malformed rows in one category
    #[error("Source category '{category}' skipped {skipped} of {total} rows (threshold {threshold})")]
    SkipRateExceeded {
        category: String,
        skipped: u64,
        total: u64,
        threshold: f64,
    },

    /// A source file could not be read at all
    #[error("Unreadable source file {path}: {message}")]
    Unreadable { path: String, message: String },
}

// Conversion from std::io::Error
impl From<std::io::Error> for DeltaError {
    fn from(err: std::io::Error) -> Self {
        DeltaError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for DeltaError {
    fn from(err: serde_json::Error) -> Self {
        DeltaError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for DeltaError {
    fn from(err: toml::de::Error) -> Self {
        DeltaError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<rusqlite::Error> for DeltaError {
    fn from(err: rusqlite::Error) -> Self {
        DeltaError::Database(err.to_string())
    }
}

impl From<csv::Error> for DeltaError {
    fn from(err: csv::Error) -> Self {
        DeltaError::Io(format!("CSV read error: {err}"))
    }
}

impl From<tokio::task::JoinError> for DeltaError {
    fn from(err: tokio::task::JoinError) -> Self {
        DeltaError::Other(format!("Background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_error_display() {
        let err = DeltaError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_ingestion_error_conversion() {
        let err: DeltaError = IngestionError::MissingCategory("partners".to_string()).into();
        assert!(matches!(err, DeltaError::Ingestion(_)));
        assert!(err.to_string().contains("partners"));
    }

    #[test]
    fn test_skip_rate_message() {
        let err = IngestionError::SkipRateExceeded {
            category: "companies".to_string(),
            skipped: 3,
            total: 10,
            threshold: 0.1,
        };
        assert_eq!(
            err.to_string(),
            "Source category 'companies' skipped 3 of 10 rows (threshold 0.1)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: DeltaError = io_err.into();
        assert!(matches!(err, DeltaError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: DeltaError = json_err.into();
        assert!(matches!(err, DeltaError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: DeltaError = toml_err.into();
        assert!(matches!(err, DeltaError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let err: DeltaError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DeltaError::Database(_)));
    }
}
