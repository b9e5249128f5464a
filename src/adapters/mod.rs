//! External integrations for cnpj-delta.
//!
//! - [`sink`] - destinations for exported shards (trait-based)
//!
//! # Design Pattern
//!
//! Adapters isolate external systems behind traits so the exporter can be
//! exercised with in-memory or failing implementations in tests:
//!
//! ```rust,no_run
//! use cnpj_delta::adapters::sink::{LocalDirectorySink, ShardSink};
//! use std::sync::Arc;
//!
//! let sink: Arc<dyn ShardSink> = Arc::new(LocalDirectorySink::new("data/output"));
//! ```

pub mod sink;
