// cnpj-delta - Incremental CNPJ registry ETL
// Copyright (c) 2025 cnpj-delta Contributors
// Licensed under the MIT License

//! # cnpj-delta - Incremental CNPJ registry ETL
//!
//! cnpj-delta turns the monthly open-data extracts of the Brazilian business
//! registry into canonical JSON documents per establishment and publishes
//! only what changed since the previous run.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Ingesting** the `;`-separated, Windows-1252 extracts into a partitioned
//!   structured store, one denormalized record per establishment
//! - **Transforming** records into canonical documents with a stable content hash
//! - **Detecting changes** against a hash cache of the last published hashes
//! - **Publishing** new and modified documents plus tombstones as shards
//! - **Verifying** a random sample of entities after every export
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (ingest, store, transform, state, export, verification)
//! - [`adapters`] - Shard destinations
//! - [`domain`] - Identifiers, records and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cnpj_delta::config::load_config;
//! use cnpj_delta::core::export::ExportCoordinator;
//! use cnpj_delta::core::ingest::StoreBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("cnpj-delta.toml")?;
//!
//!     // Rebuild the structured store from this month's extracts
//!     StoreBuilder::new(&config).build().await?;
//!
//!     // Publish what changed since the last run
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let coordinator = ExportCoordinator::new(config, shutdown_rx)?;
//!     let summary = coordinator.execute_export().await?;
//!
//!     println!("Published {} changed documents", summary.documents_published);
//!     Ok(())
//! }
//! ```
//!
//! ## Change Detection
//!
//! Each canonical document hashes to a 64-bit xxh3 digest. An entity is
//! re-published only when that digest differs from the one committed in the
//! hash cache, and the cache is only updated after a shard is durably
//! published, so a crash at any point leads to re-publication rather than
//! loss.
//!
//! ```rust
//! use cnpj_delta::core::export::{classify, ChangeKind};
//!
//! assert_eq!(classify(None, "9f2c"), ChangeKind::New);
//! assert_eq!(classify(Some("9f2c"), "9f2c"), ChangeKind::Unchanged);
//! assert_eq!(classify(Some("9f2c"), "04aa"), ChangeKind::Modified);
//! ```
//!
//! ## Error Handling
//!
//! The library returns [`domain::DeltaError`]; the binary converts it to exit
//! codes (0 ok, 1 partial failure, 2 configuration error, 5 fatal, 130
//! interrupted).

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
