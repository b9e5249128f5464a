//! Raw extract discovery
//!
//! The registry is released as a set of headerless `;`-separated files whose
//! names carry a category marker (`...ESTABELE`, `...SOCIOCSV`, ...). Files are
//! found recursively under the raw directory and grouped by category.

use crate::domain::{DeltaError, IngestionError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Category of a raw extract file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Companies,
    Establishments,
    Partners,
    TaxRegimes,
    Activities,
    Municipalities,
    LegalNatures,
    Countries,
    Qualifications,
    StatusReasons,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 10] = [
        SourceCategory::Companies,
        SourceCategory::Establishments,
        SourceCategory::Partners,
        SourceCategory::TaxRegimes,
        SourceCategory::Activities,
        SourceCategory::Municipalities,
        SourceCategory::LegalNatures,
        SourceCategory::Countries,
        SourceCategory::Qualifications,
        SourceCategory::StatusReasons,
    ];

    /// Reference (code → description) categories
    pub const REFERENCE: [SourceCategory; 6] = [
        SourceCategory::Activities,
        SourceCategory::Municipalities,
        SourceCategory::LegalNatures,
        SourceCategory::Countries,
        SourceCategory::Qualifications,
        SourceCategory::StatusReasons,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceCategory::Companies => "companies",
            SourceCategory::Establishments => "establishments",
            SourceCategory::Partners => "partners",
            SourceCategory::TaxRegimes => "tax_regimes",
            SourceCategory::Activities => "activities",
            SourceCategory::Municipalities => "municipalities",
            SourceCategory::LegalNatures => "legal_natures",
            SourceCategory::Countries => "countries",
            SourceCategory::Qualifications => "qualifications",
            SourceCategory::StatusReasons => "status_reasons",
        }
    }

    /// Upper-case fragment identifying the category in a file name
    pub fn file_marker(&self) -> &'static str {
        match self {
            SourceCategory::Companies => "EMPRECSV",
            SourceCategory::Establishments => "ESTABELE",
            SourceCategory::Partners => "SOCIOCSV",
            SourceCategory::TaxRegimes => "SIMPLES",
            SourceCategory::Activities => "CNAECSV",
            SourceCategory::Municipalities => "MUNICCSV",
            SourceCategory::LegalNatures => "NATJUCSV",
            SourceCategory::Countries => "PAISCSV",
            SourceCategory::Qualifications => "QUALSCSV",
            SourceCategory::StatusReasons => "MOTICSV",
        }
    }

    /// Number of columns a well-formed row carries
    pub fn column_count(&self) -> usize {
        match self {
            SourceCategory::Companies => 7,
            SourceCategory::Establishments => 30,
            SourceCategory::Partners => 11,
            SourceCategory::TaxRegimes => 7,
            _ => 2,
        }
    }

    /// Missing tax-regime extracts only degrade documents; everything else is fatal
    pub fn is_required(&self) -> bool {
        !matches!(self, SourceCategory::TaxRegimes)
    }

    pub fn is_reference(&self) -> bool {
        Self::REFERENCE.contains(self)
    }

    /// Matches a file name against the category markers
    pub fn from_file_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        if upper.starts_with('.') || upper.ends_with(".ZIP") {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|category| upper.contains(category.file_marker()))
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw files grouped by category, each list sorted by path
#[derive(Debug, Clone, Default)]
pub struct SourceInventory {
    files: BTreeMap<SourceCategory, Vec<PathBuf>>,
}

impl SourceInventory {
    /// Walks `raw_dir` recursively and classifies every file
    pub fn discover(raw_dir: &Path) -> Result<Self> {
        if !raw_dir.is_dir() {
            return Err(DeltaError::Configuration(format!(
                "Raw extract directory not found: {}",
                raw_dir.display()
            )));
        }

        let mut inventory = Self::default();
        let mut pending = vec![raw_dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Some(category) = SourceCategory::from_file_name(name) {
                    inventory.files.entry(category).or_default().push(path);
                }
            }
        }

        for files in inventory.files.values_mut() {
            files.sort();
        }

        Ok(inventory)
    }

    /// Files of one category in deterministic order
    pub fn files(&self, category: SourceCategory) -> &[PathBuf] {
        self.files.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fails on a required category that has no file or only empty files
    pub fn check_required(&self) -> Result<()> {
        for category in SourceCategory::ALL {
            let files = self.files(category);
            if files.is_empty() {
                if category.is_required() {
                    return Err(IngestionError::MissingCategory(category.to_string()).into());
                }
                tracing::warn!(category = %category, "Optional source category not found");
                continue;
            }

            let total_bytes: u64 = files
                .iter()
                .map(|path| std::fs::metadata(path).map(|m| m.len()).unwrap_or(0))
                .sum();
            if total_bytes == 0 && category.is_required() {
                return Err(IngestionError::EmptyCategory(category.to_string()).into());
            }
        }
        Ok(())
    }

    pub fn total_files(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("K3241.K03200Y0.D50111.EMPRECSV", Some(SourceCategory::Companies))]
    #[test_case("K3241.K03200Y9.D50111.ESTABELE", Some(SourceCategory::Establishments))]
    #[test_case("k3241.k03200y0.d50111.sociocsv", Some(SourceCategory::Partners))]
    #[test_case("F.K03200$W.SIMPLES.CSV.D50111", Some(SourceCategory::TaxRegimes))]
    #[test_case("F.K03200$Z.D50111.MOTICSV", Some(SourceCategory::StatusReasons))]
    #[test_case("Estabelecimentos0.zip", None ; "archives are ignored")]
    #[test_case("README.txt", None)]
    fn test_category_from_file_name(name: &str, expected: Option<SourceCategory>) {
        assert_eq!(SourceCategory::from_file_name(name), expected);
    }

    fn touch(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_discover_recurses_and_sorts() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("2025-03");
        std::fs::create_dir_all(&nested).unwrap();
        touch(&nested, "B.ESTABELE", "x");
        touch(temp.path(), "A.ESTABELE", "x");

        let inventory = SourceInventory::discover(temp.path()).unwrap();
        let files = inventory.files(SourceCategory::Establishments);
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
    }

    #[test]
    fn test_missing_required_category_is_fatal() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "X.EMPRECSV", "x");

        let inventory = SourceInventory::discover(temp.path()).unwrap();
        let err = inventory.check_required().unwrap_err();
        assert!(matches!(
            err,
            DeltaError::Ingestion(IngestionError::MissingCategory(_))
        ));
    }

    #[test]
    fn test_empty_required_category_is_fatal() {
        let temp = TempDir::new().unwrap();
        for category in SourceCategory::ALL {
            let contents = if category == SourceCategory::Partners { "" } else { "x" };
            touch(temp.path(), &format!("F.{}", category.file_marker()), contents);
        }

        let inventory = SourceInventory::discover(temp.path()).unwrap();
        let err = inventory.check_required().unwrap_err();
        assert!(matches!(
            err,
            DeltaError::Ingestion(IngestionError::EmptyCategory(ref c)) if c == "partners"
        ));
    }

    #[test]
    fn test_missing_tax_regimes_is_tolerated() {
        let temp = TempDir::new().unwrap();
        for category in SourceCategory::ALL {
            if category != SourceCategory::TaxRegimes {
                touch(temp.path(), &format!("F.{}", category.file_marker()), "x");
            }
        }

        let inventory = SourceInventory::discover(temp.path()).unwrap();
        assert!(inventory.check_required().is_ok());
        assert_eq!(inventory.total_files(), 9);
    }
}
