//! Post-export integrity checks
//!
//! - [`checksum`] - content hash of canonical documents and shard payload checksums
//! - [`sampler`] - random sampling of exported entities against store, cache and output
//! - [`report`] - the resulting [`VerificationReport`]

pub mod checksum;
pub mod report;
pub mod sampler;

pub use report::{MismatchKind, VerificationFailure, VerificationReport};
pub use sampler::IntegritySampler;
