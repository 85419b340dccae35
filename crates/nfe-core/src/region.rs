//! # Regions — Federative Units and the National Environment
//!
//! Every access key starts with the two-digit IBGE code of the issuing
//! state. The authority also runs a national environment (code 91) that
//! receives some event types and hosts the virtual contingency services.
//!
//! The set is closed: an unknown code or abbreviation is an error. There is
//! no fallback region, because routing an unknown state to some default
//! endpoint would turn a configuration error into a valid-looking call to
//! the wrong authority.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

macro_rules! regions {
    ($( $variant:ident => ($code:literal, $abbr:literal, $name:literal) ),+ $(,)?) => {
        /// A federative unit (or the national environment) identified by its
        /// IBGE numeric code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Region {
            $(
                #[doc = $name]
                $variant,
            )+
        }

        impl Region {
            /// Every region, in IBGE code order.
            pub const ALL: &'static [Region] = &[$(Region::$variant),+];

            /// The two-digit IBGE code.
            pub fn code(self) -> u8 {
                match self {
                    $(Region::$variant => $code,)+
                }
            }

            /// The two-letter abbreviation (`"SP"`, `"RS"`, `"AN"` …).
            pub fn abbreviation(self) -> &'static str {
                match self {
                    $(Region::$variant => $abbr,)+
                }
            }

            /// Full name of the unit.
            pub fn name(self) -> &'static str {
                match self {
                    $(Region::$variant => $name,)+
                }
            }

            /// Look a region up by its IBGE code.
            ///
            /// # Errors
            ///
            /// [`ValidationError::UnknownRegion`] if no unit has this code.
            pub fn from_code(code: u8) -> Result<Self, ValidationError> {
                match code {
                    $($code => Ok(Region::$variant),)+
                    other => Err(ValidationError::UnknownRegion(other.to_string())),
                }
            }

            /// Look a region up by abbreviation, case-insensitively.
            ///
            /// # Errors
            ///
            /// [`ValidationError::UnknownRegion`] if the abbreviation is not known.
            pub fn from_abbreviation(abbr: &str) -> Result<Self, ValidationError> {
                let upper = abbr.trim().to_ascii_uppercase();
                match upper.as_str() {
                    $($abbr => Ok(Region::$variant),)+
                    _ => Err(ValidationError::UnknownRegion(abbr.to_string())),
                }
            }
        }
    };
}

regions! {
    Rondonia => (11, "RO", "Rondônia"),
    Acre => (12, "AC", "Acre"),
    Amazonas => (13, "AM", "Amazonas"),
    Roraima => (14, "RR", "Roraima"),
    Para => (15, "PA", "Pará"),
    Amapa => (16, "AP", "Amapá"),
    Tocantins => (17, "TO", "Tocantins"),
    Maranhao => (21, "MA", "Maranhão"),
    Piaui => (22, "PI", "Piauí"),
    Ceara => (23, "CE", "Ceará"),
    RioGrandeDoNorte => (24, "RN", "Rio Grande do Norte"),
    Paraiba => (25, "PB", "Paraíba"),
    Pernambuco => (26, "PE", "Pernambuco"),
    Alagoas => (27, "AL", "Alagoas"),
    Sergipe => (28, "SE", "Sergipe"),
    Bahia => (29, "BA", "Bahia"),
    MinasGerais => (31, "MG", "Minas Gerais"),
    EspiritoSanto => (32, "ES", "Espírito Santo"),
    RioDeJaneiro => (33, "RJ", "Rio de Janeiro"),
    SaoPaulo => (35, "SP", "São Paulo"),
    Parana => (41, "PR", "Paraná"),
    SantaCatarina => (42, "SC", "Santa Catarina"),
    RioGrandeDoSul => (43, "RS", "Rio Grande do Sul"),
    MatoGrossoDoSul => (50, "MS", "Mato Grosso do Sul"),
    MatoGrosso => (51, "MT", "Mato Grosso"),
    Goias => (52, "GO", "Goiás"),
    DistritoFederal => (53, "DF", "Distrito Federal"),
    National => (91, "AN", "Ambiente Nacional"),
}

impl Region {
    /// The code zero-padded to two digits, as it appears in keys and XML.
    pub fn code_str(self) -> String {
        format!("{:02}", self.code())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

impl FromStr for Region {
    type Err = ValidationError;

    /// Accepts either the numeric code (`"35"`) or the abbreviation (`"SP"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            let code: u8 = trimmed
                .parse()
                .map_err(|_| ValidationError::UnknownRegion(s.to_string()))?;
            Region::from_code(code)
        } else {
            Region::from_abbreviation(trimmed)
        }
    }
}

impl Serialize for Region {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.abbreviation())
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
