//! Canonical document
//!
//! The canonical document is both the published output and the input of the
//! content hash, so its serialization must be byte-stable: struct fields
//! serialize in declaration order, strings are whitespace-normalized, empty
//! values become `null` and collections keep the order of the record.

use super::labels;
use crate::domain::{EntityRecord, Label};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Published document of one establishment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub cnpj: String,
    pub razao_social: Option<String>,
    pub nome_fantasia: Option<String>,
    pub situacao_cadastral: Option<String>,
    pub data_situacao_cadastral: Option<String>,
    pub motivo_situacao_cadastral: Option<String>,
    pub matriz_filial: Option<String>,
    pub data_inicio_atividade: Option<String>,
    pub cnae_principal: Option<String>,
    pub cnae_principal_descricao: Option<String>,
    pub cnaes_secundarios: Vec<String>,
    pub natureza_juridica: Option<String>,
    pub tipo_logradouro: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub cep: Option<String>,
    pub uf: Option<String>,
    pub municipio: Option<String>,
    pub pais: Option<String>,
    pub nome_cidade_exterior: Option<String>,
    pub email: Option<String>,
    pub telefones: Vec<CanonicalPhone>,
    pub capital_social: Option<Decimal>,
    pub porte_empresa: Option<String>,
    pub opcao_simples: Option<String>,
    pub data_opcao_simples: Option<String>,
    pub data_exclusao_simples: Option<String>,
    pub opcao_mei: Option<String>,
    pub data_opcao_mei: Option<String>,
    pub data_exclusao_mei: Option<String>,
    pub situacao_especial: Option<String>,
    pub data_situacao_especial: Option<String>,
    #[serde(rename = "QSA")]
    pub qsa: Vec<CanonicalPartner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPhone {
    pub ddd: Option<String>,
    pub numero: Option<String>,
    pub is_fax: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPartner {
    pub nome_socio: Option<String>,
    pub cnpj_cpf_socio: Option<String>,
    pub qualificacao_socio: Option<String>,
    pub data_entrada_sociedade: Option<String>,
    pub identificador_socio: Option<String>,
    pub faixa_etaria: Option<String>,
    pub pais: Option<String>,
    pub representante_legal: Option<String>,
    pub nome_representante: Option<String>,
    pub qualificacao_representante: Option<String>,
}

/// Collapses whitespace runs to one space and trims; empty becomes `None`
pub fn normalize_text(value: &str) -> Option<String> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn date(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

fn description(label: &Label) -> Option<String> {
    label.description.as_deref().and_then(normalize_text)
}

impl CanonicalDocument {
    pub fn from_record(record: &EntityRecord) -> Self {
        let est = &record.establishment;
        let company = record.company.as_ref();
        let regime = record.tax_regime.as_ref();

        Self {
            cnpj: record.cnpj.to_string(),
            razao_social: company.and_then(|c| normalize_text(&c.legal_name)),
            nome_fantasia: normalize_text(&est.trade_name),
            situacao_cadastral: labels::registration_status(&est.status_code),
            data_situacao_cadastral: date(est.status_date),
            motivo_situacao_cadastral: description(&est.status_reason),
            matriz_filial: labels::head_office(&est.head_office_code),
            data_inicio_atividade: date(est.activity_start),
            cnae_principal: normalize_text(&est.main_activity.code),
            cnae_principal_descricao: description(&est.main_activity),
            cnaes_secundarios: est
                .secondary_activities
                .iter()
                .filter_map(|code| normalize_text(code))
                .collect(),
            natureza_juridica: company.and_then(|c| description(&c.legal_nature)),
            tipo_logradouro: normalize_text(&est.street_type),
            logradouro: normalize_text(&est.street),
            numero: normalize_text(&est.number),
            complemento: normalize_text(&est.complement),
            bairro: normalize_text(&est.district),
            cep: normalize_text(&est.postal_code),
            uf: normalize_text(&est.state),
            municipio: description(&est.municipality),
            pais: description(&est.country),
            nome_cidade_exterior: normalize_text(&est.foreign_city),
            email: normalize_text(&est.email),
            telefones: est
                .phones
                .iter()
                .map(|p| CanonicalPhone {
                    ddd: normalize_text(&p.area_code),
                    numero: normalize_text(&p.number),
                    is_fax: p.is_fax,
                })
                .collect(),
            capital_social: company.and_then(|c| c.share_capital),
            porte_empresa: company.and_then(|c| labels::company_size(&c.size_code)),
            opcao_simples: regime.and_then(|r| normalize_text(&r.simples_option)),
            data_opcao_simples: regime.and_then(|r| date(r.simples_since)),
            data_exclusao_simples: regime.and_then(|r| date(r.simples_until)),
            opcao_mei: regime.and_then(|r| normalize_text(&r.mei_option)),
            data_opcao_mei: regime.and_then(|r| date(r.mei_since)),
            data_exclusao_mei: regime.and_then(|r| date(r.mei_until)),
            situacao_especial: normalize_text(&est.special_status),
            data_situacao_especial: date(est.special_status_date),
            qsa: record
                .partners
                .iter()
                .map(|p| CanonicalPartner {
                    nome_socio: normalize_text(&p.name),
                    cnpj_cpf_socio: normalize_text(&p.document),
                    qualificacao_socio: description(&p.qualification),
                    data_entrada_sociedade: date(p.joined_on),
                    identificador_socio: labels::partner_kind(&p.kind_code),
                    faixa_etaria: labels::age_band(&p.age_band_code),
                    pais: description(&p.country),
                    representante_legal: normalize_text(&p.representative_document),
                    nome_representante: normalize_text(&p.representative_name),
                    qualificacao_representante: description(&p.representative_qualification),
                })
                .collect(),
        }
    }

    /// Compact JSON bytes; the hashed and published representation
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("  ACME   LTDA ", Some("ACME LTDA"))]
    #[test_case("RUA\tDAS\nFLORES", Some("RUA DAS FLORES"))]
    #[test_case("   ", None)]
    #[test_case("", None)]
    fn test_normalize_text(input: &str, expected: Option<&str>) {
        assert_eq!(normalize_text(input).as_deref(), expected);
    }

    #[test]
    fn test_field_order_is_declaration_order() {
        let doc = CanonicalDocument {
            cnpj: "33000167000101".to_string(),
            razao_social: None,
            nome_fantasia: None,
            situacao_cadastral: None,
            data_situacao_cadastral: None,
            motivo_situacao_cadastral: None,
            matriz_filial: None,
            data_inicio_atividade: None,
            cnae_principal: None,
            cnae_principal_descricao: None,
            cnaes_secundarios: vec![],
            natureza_juridica: None,
            tipo_logradouro: None,
            logradouro: None,
            numero: None,
            complemento: None,
            bairro: None,
            cep: None,
            uf: None,
            municipio: None,
            pais: None,
            nome_cidade_exterior: None,
            email: None,
            telefones: vec![],
            capital_social: None,
            porte_empresa: None,
            opcao_simples: None,
            data_opcao_simples: None,
            data_exclusao_simples: None,
            opcao_mei: None,
            data_opcao_mei: None,
            data_exclusao_mei: None,
            situacao_especial: None,
            data_situacao_especial: None,
            qsa: vec![],
        };
        let json = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(json.starts_with("{\"cnpj\":\"33000167000101\",\"razao_social\":null,"));
        assert!(json.ends_with(",\"QSA\":[]}"));
        assert!(!json.contains(' '));
    }
}
