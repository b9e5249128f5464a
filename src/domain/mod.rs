//! Domain models and types for cnpj-delta.
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`Cnpj`], [`CnpjRoot`], [`PartitionKey`], [`Period`])
//! - **The denormalized entity record** ([`EntityRecord`]) built by ingestion
//! - **Error types** ([`DeltaError`], [`IngestionError`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Identifiers are validated on construction, so a [`Cnpj`] can always be
//! sliced into root, order and check digits:
//!
//! ```rust
//! use cnpj_delta::domain::Cnpj;
//!
//! # fn example() -> Result<(), String> {
//! let cnpj = Cnpj::new("33.000.167/0001-01")?;
//! assert_eq!(cnpj.root(), "33000167");
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod record;
pub mod result;

pub use errors::{DeltaError, IngestionError};
pub use ids::{Cnpj, CnpjRoot, PartitionKey, Period};
pub use record::{
    Company, EntityRecord, Establishment, Label, Partner, Phone, TaxRegime, UNKNOWN_LABEL,
};
pub use result::Result;
