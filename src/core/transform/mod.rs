//! Entity record to published document
//!
//! Every record is rendered into a [`CanonicalDocument`] whose compact JSON
//! serialization is both published and hashed. Two records that describe the
//! same entity state always render to identical bytes and therefore identical
//! hashes; a hash change is exactly a change in published content.

pub mod canonical;
pub mod labels;

pub use canonical::{normalize_text, CanonicalDocument, CanonicalPartner, CanonicalPhone};

use crate::core::verification::checksum::content_hash;
use crate::domain::{Cnpj, EntityRecord, Result};

/// A rendered document together with its content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub cnpj: Cnpj,
    /// Compact JSON of the canonical document
    pub json: String,
    /// 16 hex characters
    pub hash: String,
}

/// Render a record into its published form and hash it
///
/// # Examples
///
/// ```no_run
/// use cnpj_delta::core::transform::render;
/// # fn example(record: &cnpj_delta::domain::EntityRecord) -> cnpj_delta::domain::Result<()> {
/// let rendered = render(record)?;
/// assert_eq!(rendered.hash.len(), 16);
/// # Ok(())
/// # }
/// ```
pub fn render(record: &EntityRecord) -> Result<RenderedDocument> {
    let document = CanonicalDocument::from_record(record);
    let bytes = document.to_bytes()?;
    let hash = content_hash(&bytes);
    let json = String::from_utf8(bytes)
        .map_err(|e| crate::domain::DeltaError::Serialization(e.to_string()))?;
    Ok(RenderedDocument {
        cnpj: record.cnpj.clone(),
        json,
        hash,
    })
}
