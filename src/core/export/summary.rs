//! Export summary and reporting
//!
//! This module defines structures for tracking and reporting export results.

use crate::core::verification::report::VerificationReport;
use crate::domain::{DeltaError, PartitionKey};
use std::time::Duration;

/// Counters of one partition's export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionResult {
    pub partition: PartitionKey,
    pub scanned: u64,
    pub unchanged: u64,
    pub new: u64,
    pub modified: u64,
    pub removed: u64,
    /// Shards published and committed (planned shards in a dry run)
    pub shards_published: usize,
    pub documents_published: u64,
    pub tombstones_published: u64,
    /// The cache could not be read; everything was re-exported and removals skipped
    pub cache_fallback: bool,
    /// First cache commit that failed after its shard was published
    pub commit_error: Option<String>,
    /// Stopped at a shard boundary by a shutdown signal
    pub interrupted: bool,
}

impl PartitionResult {
    pub fn new(partition: PartitionKey) -> Self {
        Self {
            partition,
            scanned: 0,
            unchanged: 0,
            new: 0,
            modified: 0,
            removed: 0,
            shards_published: 0,
            documents_published: 0,
            tombstones_published: 0,
            cache_fallback: false,
            commit_error: None,
            interrupted: false,
        }
    }
}

/// Summary of an export operation
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Reporting period the run published under
    pub period: String,

    /// Nothing was published or committed
    pub dry_run: bool,

    /// Partitions that finished without error
    pub partitions_processed: usize,

    /// Partitions that stopped on an error or could not commit to the cache
    pub partitions_failed: usize,

    /// Partitions re-exported in full because their cache was unreadable
    pub cache_fallbacks: usize,

    /// Entity records scanned from the store
    pub scanned: u64,

    pub unchanged: u64,
    pub new: u64,
    pub modified: u64,
    pub removed: u64,

    pub shards_published: usize,
    pub documents_published: u64,
    pub tombstones_published: u64,

    /// A shutdown signal stopped the run between shards
    pub interrupted: bool,

    /// Duration of the export
    pub duration: Duration,

    /// Errors encountered during export
    pub errors: Vec<ExportError>,

    /// Verification report (if verification was run)
    pub verification_report: Option<VerificationReport>,
}

impl ExportSummary {
    /// Create a new empty export summary
    pub fn new(period: impl Into<String>, dry_run: bool) -> Self {
        Self {
            period: period.into(),
            dry_run,
            partitions_processed: 0,
            partitions_failed: 0,
            cache_fallbacks: 0,
            scanned: 0,
            unchanged: 0,
            new: 0,
            modified: 0,
            removed: 0,
            shards_published: 0,
            documents_published: 0,
            tombstones_published: 0,
            interrupted: false,
            duration: Duration::from_secs(0),
            errors: Vec::new(),
            verification_report: None,
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Fold one partition's counters into the run totals
    ///
    /// A partition whose published shards could not be committed counts as
    /// failed, but its published counters are kept.
    pub fn add_partition(&mut self, result: &PartitionResult) {
        match &result.commit_error {
            None => self.partitions_processed += 1,
            Some(message) => {
                self.partitions_failed += 1;
                self.add_error(
                    ExportError::new(
                        ExportErrorType::Cache,
                        format!("Published shards not committed: {message}"),
                    )
                    .with_context(format!("partition={}", result.partition)),
                );
            }
        }
        if result.cache_fallback {
            self.cache_fallbacks += 1;
        }
        self.scanned += result.scanned;
        self.unchanged += result.unchanged;
        self.new += result.new;
        self.modified += result.modified;
        self.removed += result.removed;
        self.shards_published += result.shards_published;
        self.documents_published += result.documents_published;
        self.tombstones_published += result.tombstones_published;
        self.interrupted |= result.interrupted;
    }

    /// Record a partition that stopped on an error
    pub fn add_partition_failure(&mut self, partition: &PartitionKey, error: &DeltaError) {
        self.partitions_failed += 1;
        self.add_error(
            ExportError::new(ExportErrorType::from(error), error.to_string())
                .with_context(format!("partition={partition}")),
        );
    }

    /// Add an error
    pub fn add_error(&mut self, error: ExportError) {
        self.errors.push(error);
    }

    /// Set the verification report
    pub fn set_verification_report(&mut self, report: VerificationReport) {
        self.verification_report = Some(report);
    }

    /// Entities whose documents were (or in a dry run would be) emitted
    pub fn changed(&self) -> u64 {
        self.new + self.modified
    }

    /// Check if the export was successful (no errors, not interrupted)
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty() && self.partitions_failed == 0 && !self.interrupted
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            period = %self.period,
            dry_run = self.dry_run,
            partitions = self.partitions_processed,
            partitions_failed = self.partitions_failed,
            cache_fallbacks = self.cache_fallbacks,
            scanned = self.scanned,
            unchanged = self.unchanged,
            new = self.new,
            modified = self.modified,
            removed = self.removed,
            shards = self.shards_published,
            documents = self.documents_published,
            tombstones = self.tombstones_published,
            interrupted = self.interrupted,
            duration_secs = self.duration.as_secs(),
            "Export completed"
        );

        if !self.errors.is_empty() {
            tracing::warn!(
                error_count = self.errors.len(),
                "Export completed with errors"
            );
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    message = %error.message,
                    context = error.context.as_deref().unwrap_or(""),
                    "Export error"
                );
            }
        }
    }
}

/// Type of export error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportErrorType {
    /// Structured store could not be read
    Store,
    /// Hash cache could not be read or written
    Cache,
    /// Shard could not be published
    Upload,
    /// Record could not be rendered
    Transformation,
    /// Verification could not run
    Verification,
    /// Configuration error
    Configuration,
    /// Unknown error
    Unknown,
}

impl From<&DeltaError> for ExportErrorType {
    fn from(error: &DeltaError) -> Self {
        match error {
            DeltaError::Store(_) => Self::Store,
            DeltaError::Cache(_) | DeltaError::Database(_) => Self::Cache,
            DeltaError::Upload(_) => Self::Upload,
            DeltaError::Serialization(_) => Self::Transformation,
            DeltaError::Validation(_) => Self::Verification,
            DeltaError::Configuration(_) => Self::Configuration,
            _ => Self::Unknown,
        }
    }
}

/// Export error with context
#[derive(Debug, Clone)]
pub struct ExportError {
    /// Type of error
    pub error_type: ExportErrorType,

    /// Error message
    pub message: String,

    /// Optional context (e.g., partition key)
    pub context: Option<String>,
}

impl ExportError {
    /// Create a new export error
    pub fn new(error_type: ExportErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            context: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition_result(key: &str, new: u64, modified: u64) -> PartitionResult {
        PartitionResult {
            scanned: 10,
            unchanged: 10 - new - modified,
            new,
            modified,
            shards_published: 1,
            documents_published: new + modified,
            ..PartitionResult::new(PartitionKey::new(key).unwrap())
        }
    }

    #[test]
    fn test_export_summary_creation() {
        let summary = ExportSummary::new("2025-05", false);
        assert_eq!(summary.period, "2025-05");
        assert_eq!(summary.scanned, 0);
        assert!(summary.errors.is_empty());
        assert!(summary.is_successful());
    }

    #[test]
    fn test_add_partition_totals() {
        let mut summary = ExportSummary::new("2025-05", false);
        summary.add_partition(&partition_result("11", 2, 1));
        summary.add_partition(&partition_result("33", 0, 4));

        assert_eq!(summary.partitions_processed, 2);
        assert_eq!(summary.scanned, 20);
        assert_eq!(summary.changed(), 7);
        assert_eq!(summary.shards_published, 2);
        assert!(summary.is_successful());
    }

    #[test]
    fn test_partition_failure_is_not_successful() {
        let mut summary = ExportSummary::new("2025-05", false);
        summary.add_partition_failure(
            &PartitionKey::new("11").unwrap(),
            &DeltaError::Upload("connection reset".to_string()),
        );

        assert_eq!(summary.partitions_failed, 1);
        assert_eq!(summary.errors[0].error_type, ExportErrorType::Upload);
        assert_eq!(summary.errors[0].context.as_deref(), Some("partition=11"));
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_uncommitted_fallback_partition_keeps_counts() {
        let mut summary = ExportSummary::new("2025-05", false);
        let mut result = partition_result("11", 3, 0);
        result.cache_fallback = true;
        result.commit_error = Some("file is not a database".to_string());
        summary.add_partition(&result);

        assert_eq!(summary.partitions_processed, 0);
        assert_eq!(summary.partitions_failed, 1);
        assert_eq!(summary.cache_fallbacks, 1);
        assert_eq!(summary.documents_published, 3);
        assert_eq!(summary.errors[0].error_type, ExportErrorType::Cache);
        assert_eq!(summary.errors[0].context.as_deref(), Some("partition=11"));
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_interrupted_is_not_successful() {
        let mut summary = ExportSummary::new("2025-05", false);
        let mut result = partition_result("11", 1, 0);
        result.interrupted = true;
        summary.add_partition(&result);
        assert!(summary.interrupted);
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_with_duration() {
        let summary =
            ExportSummary::new("2025-05", true).with_duration(Duration::from_secs(42));
        assert_eq!(summary.duration.as_secs(), 42);
        assert!(summary.dry_run);
    }
}
