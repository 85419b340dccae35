//! # Document Model, Environment, and Emission Type
//!
//! Small closed code sets that appear both inside the access key and in
//! every message sent to the authority.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ─── Document model ──────────────────────────────────────────────────

/// Fiscal document model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentModel {
    /// NF-e, model 55: business-to-business electronic invoice.
    #[serde(rename = "55")]
    Nfe,
    /// NFC-e, model 65: consumer electronic invoice.
    #[serde(rename = "65")]
    Nfce,
}

impl DocumentModel {
    /// Numeric model code.
    pub fn code(self) -> u8 {
        match self {
            Self::Nfe => 55,
            Self::Nfce => 65,
        }
    }

    /// Decode from the numeric model code.
    pub fn from_code(code: u8) -> Result<Self, ValidationError> {
        match code {
            55 => Ok(Self::Nfe),
            65 => Ok(Self::Nfce),
            other => Err(ValidationError::UnknownModel(other.to_string())),
        }
    }
}

impl fmt::Display for DocumentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for DocumentModel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: u8 = s
            .trim()
            .parse()
            .map_err(|_| ValidationError::UnknownModel(s.to_string()))?;
        Self::from_code(code)
    }
}

// ─── Environment ─────────────────────────────────────────────────────

/// Authority environment a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Documents with legal effect (`tpAmb = 1`).
    Production,
    /// Homologation environment with no legal effect (`tpAmb = 2`).
    Staging,
}

impl Environment {
    /// The `tpAmb` code.
    pub fn code(self) -> u8 {
        match self {
            Self::Production => 1,
            Self::Staging => 2,
        }
    }

    /// Decode from a `tpAmb` code.
    pub fn from_code(code: u8) -> Result<Self, ValidationError> {
        match code {
            1 => Ok(Self::Production),
            2 => Ok(Self::Staging),
            other => Err(ValidationError::UnknownEnvironment(other.to_string())),
        }
    }

    /// Whether this is the production environment.
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Staging => write!(f, "staging"),
        }
    }
}

// ─── Emission type ───────────────────────────────────────────────────

/// How the document was issued (`tpEmis`), the 35th digit of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionType {
    /// Normal online issuance.
    Normal,
    /// Contingency on security form (FS-IA).
    ContingencyFsIa,
    /// Legacy SCAN contingency, kept for decoding old keys.
    ContingencyScan,
    /// Prior electronic issuance declaration (EPEC).
    ContingencyEpec,
    /// Contingency on security form for auxiliary documents (FS-DA).
    ContingencyFsDa,
    /// Virtual contingency at the national environment (SVC-AN).
    ContingencySvcAn,
    /// Virtual contingency at the Rio Grande do Sul environment (SVC-RS).
    ContingencySvcRs,
    /// Offline contingency for consumer invoices.
    ContingencyOffline,
}

impl EmissionType {
    /// The single-digit `tpEmis` code.
    pub fn code(self) -> u8 {
        match self {
            Self::Normal => 1,
            Self::ContingencyFsIa => 2,
            Self::ContingencyScan => 3,
            Self::ContingencyEpec => 4,
            Self::ContingencyFsDa => 5,
            Self::ContingencySvcAn => 6,
            Self::ContingencySvcRs => 7,
            Self::ContingencyOffline => 9,
        }
    }

    /// Decode from the `tpEmis` digit.
    pub fn from_code(code: u8) -> Result<Self, ValidationError> {
        match code {
            1 => Ok(Self::Normal),
            2 => Ok(Self::ContingencyFsIa),
            3 => Ok(Self::ContingencyScan),
            4 => Ok(Self::ContingencyEpec),
            5 => Ok(Self::ContingencyFsDa),
            6 => Ok(Self::ContingencySvcAn),
            7 => Ok(Self::ContingencySvcRs),
            9 => Ok(Self::ContingencyOffline),
            other => Err(ValidationError::UnknownEmissionType(other.to_string())),
        }
    }

    /// Whether this emission type is any contingency mode.
    pub fn is_contingency(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for EmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_codes() {
        assert_eq!(DocumentModel::Nfe.code(), 55);
        assert_eq!(DocumentModel::from_code(65).unwrap(), DocumentModel::Nfce);
        assert!(DocumentModel::from_code(57).is_err());
        assert_eq!("55".parse::<DocumentModel>().unwrap(), DocumentModel::Nfe);
        assert!("nfe".parse::<DocumentModel>().is_err());
    }

    #[test]
    fn environment_codes() {
        assert_eq!(Environment::Production.code(), 1);
        assert_eq!(Environment::Staging.code(), 2);
        assert!(Environment::Production.is_production());
        assert!(Environment::from_code(3).is_err());
    }

    #[test]
    fn emission_type_codes_round_trip() {
        for code in [1, 2, 3, 4, 5, 6, 7, 9] {
            assert_eq!(EmissionType::from_code(code).unwrap().code(), code);
        }
        assert!(EmissionType::from_code(8).is_err());
        assert!(EmissionType::from_code(0).is_err());
        assert!(!EmissionType::Normal.is_contingency());
        assert!(EmissionType::ContingencySvcRs.is_contingency());
    }

    #[test]
    fn model_serde_uses_numeric_code() {
        let json = serde_json::to_string(&DocumentModel::Nfce).unwrap();
        assert_eq!(json, "\"65\"");
    }
}
