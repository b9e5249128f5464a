//! Row parsing for the raw extract categories
//!
//! Each category parser validates the field count and the identifiers, and
//! converts compact dates and comma-decimal amounts. A [`RowError`] makes the
//! builder skip the row and count it.

use super::source::SourceCategory;
use crate::domain::{Cnpj, CnpjRoot, Phone, TaxRegime};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Why a single row was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid date in {field}: '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid decimal in {field}: '{value}'")]
    InvalidDecimal { field: &'static str, value: String },
}

/// Checks the field count, tolerating trailing empty fields
fn check_fields(category: SourceCategory, fields: &[String]) -> Result<(), RowError> {
    let expected = category.column_count();
    let extra_filled = fields.iter().skip(expected).any(|f| !f.trim().is_empty());
    if fields.len() < expected || extra_filled {
        return Err(RowError::FieldCount {
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn text(fields: &[String], index: usize) -> String {
    fields[index].trim().to_string()
}

fn root(fields: &[String]) -> Result<CnpjRoot, RowError> {
    CnpjRoot::new(&fields[0]).map_err(RowError::InvalidIdentifier)
}

/// Parses a `YYYYMMDD` date; empty and all-zero values are absent
pub fn parse_compact_date(field: &'static str, value: &str) -> Result<Option<NaiveDate>, RowError> {
    let value = value.trim();
    if value.is_empty() || value.chars().all(|c| c == '0') {
        return Ok(None);
    }
    if value.len() != 8 {
        return Err(RowError::InvalidDate {
            field,
            value: value.to_string(),
        });
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map(Some)
        .map_err(|_| RowError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

/// Parses a monetary amount written with a comma decimal separator
///
/// When a comma is present, dots are thousands separators. The result is
/// rescaled to two decimal places.
pub fn parse_comma_decimal(field: &'static str, value: &str) -> Result<Option<Decimal>, RowError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let normalized = if value.contains(',') {
        value.replace('.', "").replace(',', ".")
    } else {
        value.to_string()
    };
    let mut amount = Decimal::from_str(&normalized).map_err(|_| RowError::InvalidDecimal {
        field,
        value: value.to_string(),
    })?;
    amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(2);
    Ok(Some(amount))
}

/// Company (legal entity) row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRow {
    pub root: CnpjRoot,
    pub legal_name: String,
    pub legal_nature_code: String,
    pub responsible_qualification_code: String,
    pub share_capital: Option<Decimal>,
    pub size_code: String,
    pub federative_entity: String,
}

impl CompanyRow {
    pub fn parse(fields: &[String]) -> Result<Self, RowError> {
        check_fields(SourceCategory::Companies, fields)?;
        Ok(Self {
            root: root(fields)?,
            legal_name: text(fields, 1),
            legal_nature_code: text(fields, 2),
            responsible_qualification_code: text(fields, 3),
            share_capital: parse_comma_decimal("capital_social", &fields[4])?,
            size_code: text(fields, 5),
            federative_entity: text(fields, 6),
        })
    }
}

/// Establishment row, before reference labels are resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishmentRow {
    pub cnpj: Cnpj,
    pub head_office_code: String,
    pub trade_name: String,
    pub status_code: String,
    pub status_date: Option<NaiveDate>,
    pub status_reason_code: String,
    pub foreign_city: String,
    pub country_code: String,
    pub activity_start: Option<NaiveDate>,
    pub main_activity_code: String,
    pub secondary_activity_codes: Vec<String>,
    pub street_type: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    pub postal_code: String,
    pub state: String,
    pub municipality_code: String,
    pub phones: Vec<Phone>,
    pub email: String,
    pub special_status: String,
    pub special_status_date: Option<NaiveDate>,
}

fn phone(fields: &[String], area: usize, number: usize, is_fax: bool) -> Option<Phone> {
    let area_code = text(fields, area);
    let number = text(fields, number);
    if area_code.is_empty() && number.is_empty() {
        return None;
    }
    Some(Phone {
        area_code,
        number,
        is_fax,
    })
}

impl EstablishmentRow {
    pub fn parse(fields: &[String]) -> Result<Self, RowError> {
        check_fields(SourceCategory::Establishments, fields)?;
        let cnpj =
            Cnpj::from_parts(&fields[0], &fields[1], &fields[2]).map_err(RowError::InvalidIdentifier)?;

        let secondary_activity_codes = fields[12]
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect();

        let phones = [
            phone(fields, 21, 22, false),
            phone(fields, 23, 24, false),
            phone(fields, 25, 26, true),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(Self {
            cnpj,
            head_office_code: text(fields, 3),
            trade_name: text(fields, 4),
            status_code: text(fields, 5),
            status_date: parse_compact_date("data_situacao_cadastral", &fields[6])?,
            status_reason_code: text(fields, 7),
            foreign_city: text(fields, 8),
            country_code: text(fields, 9),
            activity_start: parse_compact_date("data_inicio_atividade", &fields[10])?,
            main_activity_code: text(fields, 11),
            secondary_activity_codes,
            street_type: text(fields, 13),
            street: text(fields, 14),
            number: text(fields, 15),
            complement: text(fields, 16),
            district: text(fields, 17),
            postal_code: text(fields, 18),
            state: text(fields, 19),
            municipality_code: text(fields, 20),
            phones,
            email: text(fields, 27),
            special_status: text(fields, 28),
            special_status_date: parse_compact_date("data_situacao_especial", &fields[29])?,
        })
    }
}

/// Partner row, before reference labels are resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRow {
    pub root: CnpjRoot,
    pub kind_code: String,
    pub name: String,
    pub document: String,
    pub qualification_code: String,
    pub joined_on: Option<NaiveDate>,
    pub country_code: String,
    pub representative_document: String,
    pub representative_name: String,
    pub representative_qualification_code: String,
    pub age_band_code: String,
}

impl PartnerRow {
    pub fn parse(fields: &[String]) -> Result<Self, RowError> {
        check_fields(SourceCategory::Partners, fields)?;
        Ok(Self {
            root: root(fields)?,
            kind_code: text(fields, 1),
            name: text(fields, 2),
            document: text(fields, 3),
            qualification_code: text(fields, 4),
            joined_on: parse_compact_date("data_entrada_sociedade", &fields[5])?,
            country_code: text(fields, 6),
            representative_document: text(fields, 7),
            representative_name: text(fields, 8),
            representative_qualification_code: text(fields, 9),
            age_band_code: text(fields, 10),
        })
    }
}

/// Tax-regime row of one root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRegimeRow {
    pub root: CnpjRoot,
    pub regime: TaxRegime,
}

impl TaxRegimeRow {
    pub fn parse(fields: &[String]) -> Result<Self, RowError> {
        check_fields(SourceCategory::TaxRegimes, fields)?;
        Ok(Self {
            root: root(fields)?,
            regime: TaxRegime {
                simples_option: text(fields, 1),
                simples_since: parse_compact_date("data_opcao_simples", &fields[2])?,
                simples_until: parse_compact_date("data_exclusao_simples", &fields[3])?,
                mei_option: text(fields, 4),
                mei_since: parse_compact_date("data_opcao_mei", &fields[5])?,
                mei_until: parse_compact_date("data_exclusao_mei", &fields[6])?,
            },
        })
    }
}

/// Code/description pair of a reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRow {
    pub code: String,
    pub description: String,
}

impl ReferenceRow {
    pub fn parse(category: SourceCategory, fields: &[String]) -> Result<Self, RowError> {
        check_fields(category, fields)?;
        let code = text(fields, 0);
        if code.is_empty() {
            return Err(RowError::InvalidIdentifier("empty reference code".to_string()));
        }
        Ok(Self {
            code,
            description: text(fields, 1),
        })
    }
}
