//! Core business logic for cnpj-delta.
//!
//! This module contains the pipeline stages and their orchestration.
//!
//! # Modules
//!
//! - [`ingest`] - Raw extract discovery, decoding, parsing and the store builder
//! - [`store`] - The partitioned structured store
//! - [`state`] - The hash cache of last published content hashes
//! - [`transform`] - Canonical documents and content hashing
//! - [`export`] - Change detection, shard publishing and cache commits
//! - [`verification`] - Integrity sampling after export
//! - [`archive`] - Full document archive with its `info.json`
//!
//! # Export Workflow
//!
//! 1. **Ingest**: Build the structured store from raw extracts (staged, swapped in atomically)
//! 2. **Scan**: Read each partition's records in identifier order
//! 3. **Render**: Produce the canonical document and its content hash
//! 4. **Diff**: Classify against the hash cache as unchanged, new or modified
//! 5. **Publish**: Flush full shards to the sink, then commit them to the cache
//! 6. **Tombstone**: Emit cached identifiers the scan did not see
//! 7. **Verify** (optional): Sample entities against store, cache and output
//!
//! # Example
//!
//! ```rust,no_run
//! use cnpj_delta::config::load_config;
//! use cnpj_delta::core::export::ExportCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("cnpj-delta.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let coordinator = ExportCoordinator::new(config, shutdown_rx)?;
//! let summary = coordinator.execute_export().await?;
//!
//! println!("New: {}", summary.new);
//! println!("Modified: {}", summary.modified);
//! println!("Removed: {}", summary.removed);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod export;
pub mod ingest;
pub mod state;
pub mod store;
pub mod transform;
pub mod verification;
