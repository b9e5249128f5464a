//! Fixed code enumerations of the registry layout
//!
//! These codes are defined by the registry's file layout rather than shipped
//! as reference tables. Unknown non-empty codes map to [`UNKNOWN_LABEL`].

use crate::domain::UNKNOWN_LABEL;

fn lookup(code: &str, pad: usize, table: &[(&str, &'static str)]) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let padded = format!("{code:0>pad$}");
    let label = table
        .iter()
        .find(|(known, _)| *known == padded)
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN_LABEL);
    Some(label.to_string())
}

/// Registration status (`situacao_cadastral`)
pub fn registration_status(code: &str) -> Option<String> {
    lookup(
        code,
        2,
        &[
            ("01", "Nula"),
            ("02", "Ativa"),
            ("03", "Suspensa"),
            ("04", "Inapta"),
            ("08", "Baixada"),
        ],
    )
}

/// Head office or branch
pub fn head_office(code: &str) -> Option<String> {
    lookup(code, 1, &[("1", "Matriz"), ("2", "Filial")])
}

/// Company size (`porte_empresa`)
pub fn company_size(code: &str) -> Option<String> {
    lookup(
        code,
        2,
        &[
            ("00", "Não informado"),
            ("01", "Microempresa (ME)"),
            ("03", "Empresa de Pequeno Porte (EPP)"),
            ("05", "Demais"),
        ],
    )
}

/// Partner kind (`identificador_socio`)
pub fn partner_kind(code: &str) -> Option<String> {
    lookup(
        code,
        1,
        &[
            ("1", "Pessoa Jurídica"),
            ("2", "Pessoa Física"),
            ("3", "Estrangeiro"),
        ],
    )
}

/// Partner age band (`faixa_etaria`)
pub fn age_band(code: &str) -> Option<String> {
    lookup(
        code,
        1,
        &[
            ("0", "Não se aplica"),
            ("1", "0 a 12 anos"),
            ("2", "13 a 20 anos"),
            ("3", "21 a 30 anos"),
            ("4", "31 a 40 anos"),
            ("5", "41 a 50 anos"),
            ("6", "51 a 60 anos"),
            ("7", "61 a 70 anos"),
            ("8", "71 a 80 anos"),
            ("9", "Mais de 80 anos"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_zero_padded() {
        assert_eq!(registration_status("2").as_deref(), Some("Ativa"));
        assert_eq!(registration_status("08").as_deref(), Some("Baixada"));
    }

    #[test]
    fn test_unknown_and_empty_codes() {
        assert_eq!(registration_status("07").as_deref(), Some(UNKNOWN_LABEL));
        assert_eq!(registration_status(""), None);
        assert_eq!(company_size(" "), None);
    }

    #[test]
    fn test_partner_enumerations() {
        assert_eq!(partner_kind("2").as_deref(), Some("Pessoa Física"));
        assert_eq!(age_band("9").as_deref(), Some("Mais de 80 anos"));
        assert_eq!(head_office("1").as_deref(), Some("Matriz"));
    }
}
