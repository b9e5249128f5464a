//! Change-detection export
//!
//! This module provides the export side of the pipeline:
//! - Change classification against the hash cache
//! - Shard accumulation and keying
//! - Export coordination, publishing and cache commits
//! - Summary and reporting

pub mod batch;
pub mod coordinator;
pub mod diff;
pub mod summary;

pub use batch::{ExportShard, ShardAccumulator};
pub use coordinator::ExportCoordinator;
pub use diff::{classify, ChangeKind, KnownHashes};
pub use summary::{ExportError, ExportErrorType, ExportSummary, PartitionResult};
