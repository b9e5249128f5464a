//! Domain identifier types with validation
//!
//! Newtype wrappers for registry identifiers. Each type guarantees its format on
//! construction so downstream code can slice them without re-checking.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of the legal-entity root
pub const ROOT_LEN: usize = 8;

/// Length of a full registry number
pub const CNPJ_LEN: usize = 14;

fn is_id_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_uppercase()
}

/// Registry number of one establishment
///
/// Fourteen characters: an 8-character root shared by every establishment of
/// the same legal entity, a 4-character order and 2 numeric check digits.
/// Masks (`12.345.678/0001-95`) are accepted and stripped.
///
/// # Examples
///
/// ```
/// use cnpj_delta::domain::ids::Cnpj;
///
/// let cnpj = Cnpj::new("12.345.678/0001-95").unwrap();
/// assert_eq!(cnpj.as_str(), "12345678000195");
/// assert_eq!(cnpj.root(), "12345678");
/// assert_eq!(cnpj.order(), "0001");
/// assert_eq!(cnpj.check_digits(), "95");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cnpj(String);

impl Cnpj {
    /// Creates a new Cnpj, stripping mask characters
    pub fn new(id: impl AsRef<str>) -> Result<Self, String> {
        let cleaned: String = id
            .as_ref()
            .chars()
            .filter(|c| !matches!(c, '.' | '/' | '-') && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if !cleaned.is_ascii() {
            return Err(format!("CNPJ contains invalid characters: '{}'", id.as_ref()));
        }

        if cleaned.len() != CNPJ_LEN {
            return Err(format!(
                "CNPJ must have {CNPJ_LEN} characters, got {} in '{}'",
                cleaned.len(),
                id.as_ref()
            ));
        }

        let (body, check) = cleaned.split_at(12);
        if !body.chars().all(is_id_char) || !check.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("CNPJ contains invalid characters: '{}'", id.as_ref()));
        }

        let first = cleaned.as_bytes()[0];
        if cleaned.bytes().all(|b| b == first) {
            return Err(format!("CNPJ cannot be a repeated sequence: '{cleaned}'"));
        }

        Ok(Self(cleaned))
    }

    /// Builds a Cnpj from the three columns the establishment extract carries
    pub fn from_parts(root: &str, order: &str, check: &str) -> Result<Self, String> {
        Self::new(format!("{}{}{}", root.trim(), order.trim(), check.trim()))
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 8-character legal-entity root
    pub fn root(&self) -> &str {
        &self.0[..ROOT_LEN]
    }

    /// The 4-character establishment order
    pub fn order(&self) -> &str {
        &self.0[ROOT_LEN..12]
    }

    /// The 2 check digits
    pub fn check_digits(&self) -> &str {
        &self.0[12..]
    }

    /// Partition this identifier belongs to
    pub fn partition(&self, prefix_len: usize) -> PartitionKey {
        PartitionKey::for_root(self.root(), prefix_len)
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cnpj {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Cnpj {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cnpj> for String {
    fn from(value: Cnpj) -> Self {
        value.0
    }
}

impl AsRef<str> for Cnpj {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Legal-entity root (first 8 characters of a registry number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CnpjRoot(String);

impl CnpjRoot {
    /// Creates a new root, accepting only the 8-character form
    pub fn new(root: impl AsRef<str>) -> Result<Self, String> {
        let root = root.as_ref().trim().to_ascii_uppercase();
        if root.len() != ROOT_LEN || !root.chars().all(is_id_char) {
            return Err(format!("Invalid CNPJ root: '{root}'"));
        }
        Ok(Self(root))
    }

    /// Returns the root as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Partition this root belongs to
    pub fn partition(&self, prefix_len: usize) -> PartitionKey {
        PartitionKey::for_root(&self.0, prefix_len)
    }
}

impl fmt::Display for CnpjRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CnpjRoot {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key of one store / cache partition: a fixed-width prefix of the root
///
/// ```
/// use cnpj_delta::domain::ids::{Cnpj, PartitionKey};
///
/// let cnpj = Cnpj::new("12345678000195").unwrap();
/// assert_eq!(cnpj.partition(2), PartitionKey::new("12").unwrap());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a partition key from an already-computed prefix
    pub fn new(key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        if key.is_empty() || key.len() > ROOT_LEN || !key.chars().all(is_id_char) {
            return Err(format!("Invalid partition key: '{key}'"));
        }
        Ok(Self(key))
    }

    /// Derives the partition of a root. `root` is assumed validated.
    pub fn for_root(root: &str, prefix_len: usize) -> Self {
        let len = prefix_len.clamp(1, ROOT_LEN).min(root.len());
        Self(root[..len].to_string())
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartitionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reporting period (`YYYY-MM`) a run publishes under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period(String);

impl Period {
    /// Creates a period, validating the `YYYY-MM` format
    pub fn new(period: impl Into<String>) -> Result<Self, String> {
        let period = period.into();
        let valid = period.len() == 7
            && NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d").is_ok();
        if !valid {
            return Err(format!("Invalid period '{period}', expected YYYY-MM"));
        }
        Ok(Self(period))
    }

    /// The current UTC month
    pub fn current() -> Self {
        Self(Utc::now().format("%Y-%m").to_string())
    }

    /// Returns the period as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_cnpj_strips_mask() {
        let cnpj = Cnpj::new("12.345.678/0001-95").unwrap();
        assert_eq!(cnpj.as_str(), "12345678000195");
        assert_eq!(cnpj.root(), "12345678");
        assert_eq!(cnpj.order(), "0001");
        assert_eq!(cnpj.check_digits(), "95");
    }

    #[test]
    fn test_cnpj_accepts_alphanumeric_body() {
        let cnpj = Cnpj::new("12.abc.345/01de-35").unwrap();
        assert_eq!(cnpj.as_str(), "12ABC34501DE35");
        assert_eq!(cnpj.root(), "12ABC345");
    }

    #[test_case("1234567800019" ; "too short")]
    #[test_case("123456780001955" ; "too long")]
    #[test_case("11111111111111" ; "repeated sequence")]
    #[test_case("123456780001A5" ; "letter in check digits")]
    #[test_case("12345678#00195" ; "symbol")]
    #[test_case("11999888000É1" ; "non ascii letter")]
    #[test_case("1199988800É" ; "non ascii short")]
    fn test_cnpj_rejects(input: &str) {
        assert!(Cnpj::new(input).is_err());
    }

    #[test]
    fn test_cnpj_from_parts() {
        let cnpj = Cnpj::from_parts("33000167", "0001", "01").unwrap();
        assert_eq!(cnpj.as_str(), "33000167000101");
    }

    #[test]
    fn test_cnpj_serde_round_trip_validates() {
        let json = serde_json::to_string(&Cnpj::new("33000167000101").unwrap()).unwrap();
        assert_eq!(json, "\"33000167000101\"");
        assert!(serde_json::from_str::<Cnpj>("\"123\"").is_err());
    }

    #[test_case(1, "3" ; "one char")]
    #[test_case(2, "33" ; "two chars")]
    #[test_case(4, "3300" ; "four chars")]
    #[test_case(20, "33000167" ; "clamped to root")]
    fn test_partition_is_root_prefix(prefix_len: usize, expected: &str) {
        let cnpj = Cnpj::new("33000167000101").unwrap();
        assert_eq!(cnpj.partition(prefix_len).as_str(), expected);
    }

    #[test]
    fn test_establishments_share_partition() {
        let head = Cnpj::new("33000167000101").unwrap();
        let branch = Cnpj::new("33000167123456").unwrap();
        assert_eq!(head.partition(3), branch.partition(3));
    }

    #[test]
    fn test_root_validation() {
        assert!(CnpjRoot::new("33000167").is_ok());
        assert!(CnpjRoot::new("3300016").is_err());
        assert_eq!(CnpjRoot::new(" 33000167 ").unwrap().as_str(), "33000167");
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new("2025-03").is_ok());
        assert!(Period::new("2025-13").is_err());
        assert!(Period::new("2025-3").is_err());
        assert_eq!(Period::current().as_str().len(), 7);
    }
}
