//! Denormalized entity record
//!
//! One record per establishment, carrying the legal-entity attributes of its
//! root, the tax-regime row, the partners and every resolved reference label.
//! Records are what the structured store persists and what the canonical
//! document is derived from.

use super::ids::Cnpj;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label assigned to a non-empty code that no reference table knows
pub const UNKNOWN_LABEL: &str = "DESCONHECIDO";

/// A code together with its resolved description
///
/// `description` is `None` exactly when `code` is empty. Unmatched non-empty
/// codes resolve to [`UNKNOWN_LABEL`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub code: String,
    pub description: Option<String>,
}

impl Label {
    /// Resolves `code` against a reference table
    pub fn resolve(code: &str, table: &HashMap<String, String>) -> Self {
        let code = code.trim();
        if code.is_empty() {
            return Self::default();
        }
        let description = table
            .get(code)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        Self {
            code: code.to_string(),
            description: Some(description),
        }
    }

    /// True when no code was present in the source row
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Legal-entity attributes shared by all establishments of one root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub legal_name: String,
    pub legal_nature: Label,
    pub responsible_qualification: Label,
    pub share_capital: Option<Decimal>,
    pub size_code: String,
    pub federative_entity: String,
}

/// A phone slot of the establishment row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    pub area_code: String,
    pub number: String,
    pub is_fax: bool,
}

/// Attributes specific to one establishment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Establishment {
    pub head_office_code: String,
    pub trade_name: String,
    pub status_code: String,
    pub status_date: Option<NaiveDate>,
    pub status_reason: Label,
    pub foreign_city: String,
    pub country: Label,
    pub activity_start: Option<NaiveDate>,
    pub main_activity: Label,
    pub secondary_activities: Vec<String>,
    pub street_type: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    pub postal_code: String,
    pub state: String,
    pub municipality: Label,
    pub phones: Vec<Phone>,
    pub email: String,
    pub special_status: String,
    pub special_status_date: Option<NaiveDate>,
}

/// Simplified tax regime options of the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRegime {
    pub simples_option: String,
    pub simples_since: Option<NaiveDate>,
    pub simples_until: Option<NaiveDate>,
    pub mei_option: String,
    pub mei_since: Option<NaiveDate>,
    pub mei_until: Option<NaiveDate>,
}

/// One partner of the legal entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub kind_code: String,
    pub name: String,
    pub document: String,
    pub qualification: Label,
    pub joined_on: Option<NaiveDate>,
    pub country: Label,
    pub representative_document: String,
    pub representative_name: String,
    pub representative_qualification: Label,
    pub age_band_code: String,
}

impl Partner {
    /// Sort key that makes partner order independent of extract row order
    pub fn sort_key(&self) -> (String, String, Option<NaiveDate>, String) {
        (
            self.name.clone(),
            self.document.clone(),
            self.joined_on,
            self.qualification.code.clone(),
        )
    }
}

/// The denormalized view of one establishment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub cnpj: Cnpj,
    pub establishment: Establishment,
    /// Absent when the root has no company row (orphan establishment)
    pub company: Option<Company>,
    pub tax_regime: Option<TaxRegime>,
    pub partners: Vec<Partner>,
}

impl EntityRecord {
    pub fn has_partners(&self) -> bool {
        !self.partners.is_empty()
    }

    pub fn has_tax_regime(&self) -> bool {
        self.tax_regime.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HashMap<String, String> {
        HashMap::from([("6201501".to_string(), "Desenvolvimento de software".to_string())])
    }

    #[test]
    fn test_label_resolves_known_code() {
        let label = Label::resolve(" 6201501 ", &table());
        assert_eq!(label.code, "6201501");
        assert_eq!(label.description.as_deref(), Some("Desenvolvimento de software"));
    }

    #[test]
    fn test_label_unknown_code_gets_sentinel() {
        let label = Label::resolve("9999999", &table());
        assert_eq!(label.description.as_deref(), Some(UNKNOWN_LABEL));
    }

    #[test]
    fn test_label_empty_code_is_absent() {
        let label = Label::resolve("  ", &table());
        assert!(label.is_empty());
        assert!(label.description.is_none());
    }
}
