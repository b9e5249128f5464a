// Hash cache: last published content hash per entity

pub mod cache;
pub mod entry;

pub use cache::{HashCache, PartitionCache, LAYOUT_FILE};
pub use entry::{CacheEntry, CacheStats, EntryState, ShardCommit, ShardLogEntry};
