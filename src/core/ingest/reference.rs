//! In-memory reference tables and label resolution

use super::parse::{CompanyRow, EstablishmentRow, PartnerRow, TaxRegimeRow};
use super::source::SourceCategory;
use crate::domain::{Cnpj, Company, EntityRecord, Establishment, Label, Partner};
use std::collections::HashMap;

/// Code → description maps of the six reference categories
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    tables: HashMap<SourceCategory, HashMap<String, String>>,
}

impl ReferenceTables {
    /// Inserts one entry; later rows for the same code win
    pub fn insert(&mut self, category: SourceCategory, code: String, description: String) {
        self.tables
            .entry(category)
            .or_default()
            .insert(code, description);
    }

    pub fn len(&self, category: SourceCategory) -> usize {
        self.tables.get(&category).map(HashMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, category: SourceCategory) -> bool {
        self.len(category) == 0
    }

    pub fn resolve(&self, category: SourceCategory, code: &str) -> Label {
        match self.tables.get(&category) {
            Some(table) => Label::resolve(code, table),
            None => Label::resolve(code, &HashMap::new()),
        }
    }

    /// Joins one establishment with its root's rows into the denormalized record
    pub fn denormalize(
        &self,
        establishment: EstablishmentRow,
        company: Option<&CompanyRow>,
        tax_regime: Option<&TaxRegimeRow>,
        partners: &[PartnerRow],
    ) -> EntityRecord {
        let mut partners: Vec<Partner> = partners.iter().map(|p| self.partner(p)).collect();
        partners.sort_by_key(Partner::sort_key);

        let cnpj: Cnpj = establishment.cnpj.clone();
        EntityRecord {
            cnpj,
            establishment: self.establishment(establishment),
            company: company.map(|c| self.company(c)),
            tax_regime: tax_regime.map(|t| t.regime.clone()),
            partners,
        }
    }

    fn company(&self, row: &CompanyRow) -> Company {
        Company {
            legal_name: row.legal_name.clone(),
            legal_nature: self.resolve(SourceCategory::LegalNatures, &row.legal_nature_code),
            responsible_qualification: self.resolve(
                SourceCategory::Qualifications,
                &row.responsible_qualification_code,
            ),
            share_capital: row.share_capital,
            size_code: row.size_code.clone(),
            federative_entity: row.federative_entity.clone(),
        }
    }

    fn establishment(&self, row: EstablishmentRow) -> Establishment {
        Establishment {
            status_reason: self.resolve(SourceCategory::StatusReasons, &row.status_reason_code),
            country: self.resolve(SourceCategory::Countries, &row.country_code),
            main_activity: self.resolve(SourceCategory::Activities, &row.main_activity_code),
            municipality: self.resolve(SourceCategory::Municipalities, &row.municipality_code),
            head_office_code: row.head_office_code,
            trade_name: row.trade_name,
            status_code: row.status_code,
            status_date: row.status_date,
            foreign_city: row.foreign_city,
            activity_start: row.activity_start,
            secondary_activities: row.secondary_activity_codes,
            street_type: row.street_type,
            street: row.street,
            number: row.number,
            complement: row.complement,
            district: row.district,
            postal_code: row.postal_code,
            state: row.state,
            phones: row.phones,
            email: row.email,
            special_status: row.special_status,
            special_status_date: row.special_status_date,
        }
    }

    fn partner(&self, row: &PartnerRow) -> Partner {
        Partner {
            kind_code: row.kind_code.clone(),
            name: row.name.clone(),
            document: row.document.clone(),
            qualification: self.resolve(SourceCategory::Qualifications, &row.qualification_code),
            joined_on: row.joined_on,
            country: self.resolve(SourceCategory::Countries, &row.country_code),
            representative_document: row.representative_document.clone(),
            representative_name: row.representative_name.clone(),
            representative_qualification: self.resolve(
                SourceCategory::Qualifications,
                &row.representative_qualification_code,
            ),
            age_band_code: row.age_band_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CnpjRoot, UNKNOWN_LABEL};

    fn partner(name: &str) -> PartnerRow {
        PartnerRow {
            root: CnpjRoot::new("33000167").unwrap(),
            kind_code: "2".to_string(),
            name: name.to_string(),
            document: "***123456**".to_string(),
            qualification_code: "49".to_string(),
            joined_on: None,
            country_code: String::new(),
            representative_document: String::new(),
            representative_name: String::new(),
            representative_qualification_code: "00".to_string(),
            age_band_code: "5".to_string(),
        }
    }

    #[test]
    fn test_resolve_without_table_uses_sentinel() {
        let tables = ReferenceTables::default();
        let label = tables.resolve(SourceCategory::Countries, "105");
        assert_eq!(label.description.as_deref(), Some(UNKNOWN_LABEL));
    }

    #[test]
    fn test_later_rows_win() {
        let mut tables = ReferenceTables::default();
        tables.insert(SourceCategory::Countries, "105".into(), "BRASL".into());
        tables.insert(SourceCategory::Countries, "105".into(), "BRASIL".into());
        assert_eq!(tables.len(SourceCategory::Countries), 1);
        assert_eq!(
            tables.resolve(SourceCategory::Countries, "105").description.as_deref(),
            Some("BRASIL")
        );
    }

    #[test]
    fn test_partners_sorted_independent_of_row_order() {
        let mut tables = ReferenceTables::default();
        tables.insert(SourceCategory::Qualifications, "49".into(), "Sócio-Administrador".into());

        let mut fields = vec![String::new(); 30];
        fields[0] = "33000167".into();
        fields[1] = "0001".into();
        fields[2] = "01".into();
        let est = EstablishmentRow::parse(&fields).unwrap();

        let forward = tables.denormalize(est.clone(), None, None, &[partner("ANA"), partner("BRUNO")]);
        let backward = tables.denormalize(est, None, None, &[partner("BRUNO"), partner("ANA")]);
        assert_eq!(forward, backward);
        assert_eq!(forward.partners[0].name, "ANA");
        assert!(forward.company.is_none());
    }
}
