//! Issuer tax identifiers.
//!
//! Businesses issue under a 14-digit CNPJ; rural producers and some
//! individuals issue under an 11-digit CPF. Inside the access key both occupy
//! a 14-digit field, with the CPF left-padded with zeros.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tax id of a document issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum IssuerId {
    /// 14-digit company registry number.
    Cnpj(String),
    /// 11-digit individual taxpayer number.
    Cpf(String),
}

impl IssuerId {
    /// Classify and validate a tax id. Punctuation (`.`, `/`, `-`) is
    /// stripped before checking.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidTaxId`] when the digits are neither 11 nor
    /// 14 long, or non-digit characters remain.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = value.as_ref();
        let digits: String = raw
            .chars()
            .filter(|c| !matches!(c, '.' | '/' | '-'))
            .collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidTaxId(raw.to_string()));
        }
        match digits.len() {
            14 => Ok(Self::Cnpj(digits)),
            11 => Ok(Self::Cpf(digits)),
            _ => Err(ValidationError::InvalidTaxId(raw.to_string())),
        }
    }

    /// The bare digits.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cnpj(s) | Self::Cpf(s) => s,
        }
    }

    /// The id left-padded to the 14-digit key field.
    pub fn padded(&self) -> String {
        format!("{:0>14}", self.as_str())
    }

    /// The XML element name that carries this id.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cnpj(_) => "CNPJ",
            Self::Cpf(_) => "CPF",
        }
    }
}

impl fmt::Display for IssuerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<IssuerId> for String {
    fn from(id: IssuerId) -> Self {
        id.as_str().to_string()
    }
}

impl<'de> Deserialize<'de> for IssuerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cnpj_with_punctuation() {
        let id = IssuerId::new("58.716.523/0001-19").unwrap();
        assert_eq!(id, IssuerId::Cnpj("58716523000119".into()));
        assert_eq!(id.tag(), "CNPJ");
        assert_eq!(id.padded(), "58716523000119");
    }

    #[test]
    fn cpf_is_padded_to_fourteen() {
        let id = IssuerId::new("123.456.789-09").unwrap();
        assert_eq!(id.tag(), "CPF");
        assert_eq!(id.padded(), "00012345678909");
    }

    #[test]
    fn rejects_other_widths_and_letters() {
        assert!(IssuerId::new("").is_err());
        assert!(IssuerId::new("1234567890").is_err());
        assert!(IssuerId::new("5871652300011A").is_err());
    }
}
