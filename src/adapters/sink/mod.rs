//! Shard sinks
//!
//! Trait-based destination for exported shards. The local directory sink is
//! the default; remote storage clients implement [`ShardSink`] outside this
//! crate.

pub mod local;
pub mod traits;

pub use local::LocalDirectorySink;
pub use traits::{shard_key, PublishedDocument, ShardManifest, ShardPayload, ShardSink};

use crate::config::DeltaConfig;
use std::sync::Arc;

/// Creates the sink the configuration points at
pub fn create_sink(config: &DeltaConfig) -> Arc<dyn ShardSink> {
    tracing::info!(
        output_dir = %config.paths.output_dir.display(),
        "Using local directory shard sink"
    );
    Arc::new(LocalDirectorySink::new(config.paths.output_dir.clone()))
}
