//! Hashing for change detection and shard integrity
//!
//! Two different digests are used:
//!
//! - [`content_hash`]: 64-bit XXH3 of a canonical document. Cheap to compute
//!   for every record of every run, and stored in the hash cache.
//! - [`payload_checksum`]: SHA-256 of a whole shard payload, written to the
//!   shard manifest and the shard log so a published shard can be checked.

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;

/// Content hash of canonical document bytes, as 16 lowercase hex characters
///
/// # Examples
///
/// ```
/// use cnpj_delta::core::verification::checksum::content_hash;
///
/// let hash = content_hash(br#"{"cnpj":"11222333000181"}"#);
/// assert_eq!(hash.len(), 16);
/// ```
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

/// SHA-256 checksum of raw bytes, hex encoded (64 characters)
pub fn payload_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{result:x}")
}
