//! Verification report structures
//!
//! This module defines the structures for reporting sampled integrity checks.

use crate::domain::Cnpj;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of sampling exported entities against store, cache and output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// When the verification was performed
    pub verified_at: DateTime<Utc>,

    /// Total number of identifiers checked
    pub total_verified: usize,

    /// Number of identifiers whose hashes (and published bytes) matched
    pub passed: usize,

    /// Number of identifiers with a mismatch
    pub failed: usize,

    /// Number of passing identifiers also compared byte-for-byte with the published document
    pub published_compared: usize,

    /// List of failed verifications with details
    pub failures: Vec<VerificationFailure>,

    /// Duration of verification in milliseconds
    pub duration_ms: u64,
}

/// Why a sampled identifier failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Sampled from the store but no longer readable there
    MissingFromStore,
    /// No live cache entry for an entity present in the store
    NotCommitted,
    /// Cache hash differs from the hash of the re-derived document
    HashMismatch,
    /// Published bytes differ from the re-derived document
    PublishedMismatch,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingFromStore => "record missing from structured store",
            Self::NotCommitted => "no committed hash in cache",
            Self::HashMismatch => "cached hash differs from store-derived hash",
            Self::PublishedMismatch => "published document differs from store-derived document",
        };
        f.write_str(text)
    }
}

/// Details of a failed verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub cnpj: Cnpj,

    pub kind: MismatchKind,

    /// Hash committed in the cache, if any
    pub expected_hash: Option<String>,

    /// Hash of the document re-derived from the store, if any
    pub actual_hash: Option<String>,
}

impl VerificationReport {
    /// Create a new verification report
    pub fn new() -> Self {
        Self {
            verified_at: Utc::now(),
            total_verified: 0,
            passed: 0,
            failed: 0,
            published_compared: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Record a successful verification
    pub fn record_pass(&mut self, compared_published: bool) {
        self.total_verified += 1;
        self.passed += 1;
        if compared_published {
            self.published_compared += 1;
        }
    }

    /// Record a failed verification
    pub fn record_failure(&mut self, failure: VerificationFailure) {
        self.total_verified += 1;
        self.failed += 1;
        self.failures.push(failure);
    }

    /// Set the duration of verification
    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Check if all verifications passed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_verified == 0 {
            return 100.0;
        }
        (self.passed as f64 / self.total_verified as f64) * 100.0
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📊 Verification Report\n");
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  Total verified: {}\n", self.total_verified));
        summary.push_str(&format!("  ✅ Passed: {}\n", self.passed));
        summary.push_str(&format!("  ❌ Failed: {}\n", self.failed));
        summary.push_str(&format!(
            "  Compared with published output: {}\n",
            self.published_compared
        ));
        summary.push_str(&format!("  Success rate: {:.2}%\n", self.success_rate()));

        if !self.failures.is_empty() {
            summary.push_str("\n❌ Failures:\n");
            for (i, failure) in self.failures.iter().enumerate() {
                summary.push_str(&format!("  {}. CNPJ: {}\n", i + 1, failure.cnpj));
                summary.push_str(&format!("     Reason: {}\n", failure.kind));
                if let Some(expected) = &failure.expected_hash {
                    summary.push_str(&format!("     Cached hash: {expected}\n"));
                }
                if let Some(actual) = &failure.actual_hash {
                    summary.push_str(&format!("     Store hash: {actual}\n"));
                }
            }
        }

        summary
    }
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: MismatchKind) -> VerificationFailure {
        VerificationFailure {
            cnpj: Cnpj::new("11222333000181").unwrap(),
            kind,
            expected_hash: Some("00000000000000aa".to_string()),
            actual_hash: Some("00000000000000bb".to_string()),
        }
    }

    #[test]
    fn test_verification_report_new() {
        let report = VerificationReport::new();
        assert_eq!(report.total_verified, 0);
        assert_eq!(report.passed, 0);
        assert_eq!(report.failed, 0);
        assert!(report.failures.is_empty());
        assert!(report.is_success());
    }

    #[test]
    fn test_record_pass() {
        let mut report = VerificationReport::new();
        report.record_pass(true);
        report.record_pass(false);

        assert_eq!(report.total_verified, 2);
        assert_eq!(report.passed, 2);
        assert_eq!(report.published_compared, 1);
        assert!(report.is_success());
    }

    #[test]
    fn test_record_failure() {
        let mut report = VerificationReport::new();
        report.record_failure(failure(MismatchKind::HashMismatch));

        assert_eq!(report.total_verified, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_success_rate() {
        let mut report = VerificationReport::new();
        report.record_pass(false);
        report.record_pass(false);
        report.record_pass(false);
        report.record_failure(failure(MismatchKind::NotCommitted));

        assert_eq!(report.success_rate(), 75.0);
    }

    #[test]
    fn test_success_rate_empty() {
        let report = VerificationReport::new();
        assert_eq!(report.success_rate(), 100.0);
    }

    #[test]
    fn test_format_summary() {
        let mut report = VerificationReport::new();
        report.record_pass(true);
        report.record_failure(failure(MismatchKind::PublishedMismatch));
        report.set_duration(1500);

        let summary = report.format_summary();
        assert!(summary.contains("Total verified: 2"));
        assert!(summary.contains("Failed: 1"));
        assert!(summary.contains("Duration: 1500 ms"));
        assert!(summary.contains("CNPJ: 11222333000181"));
        assert!(summary.contains("published document differs"));
    }
}
