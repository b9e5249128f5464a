//! Structured store builder
//!
//! Turns the raw registry extracts into the partitioned structured store:
//!
//! 1. [`source`] finds the extract files of every category
//! 2. [`reader`] streams `;`-separated rows, decoding legacy encodings
//! 3. [`parse`] validates rows and converts dates and amounts
//! 4. [`reference`] resolves codes to labels and joins rows per establishment
//! 5. [`builder`] stages rows per partition, materializes records and swaps
//!    the new store in atomically

pub mod builder;
pub mod parse;
pub mod reader;
pub mod reference;
pub mod source;

pub use builder::{IngestSummary, StoreBuilder};
pub use parse::RowError;
pub use reference::ReferenceTables;
pub use source::{SourceCategory, SourceInventory};
