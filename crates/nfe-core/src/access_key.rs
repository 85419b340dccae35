//! # Access Key Codec
//!
//! The access key is the 44-digit self-checking identifier of a fiscal
//! document. It is a fixed-width concatenation of nine fields:
//!
//! ```text
//!  cUF  AAMM  issuer (14)     mod  serie  nNF (9)    tpEmis cNF (8)   cDV
//!  35   2410  58716523000119  55   001    000000123  1      12345678  1
//! ```
//!
//! The last digit is a mod-11 check over the first 43. See
//! [`mod11_check_digit`] for the exact weighting.
//!
//! ## Construction
//!
//! - [`AccessKeyBuilder`] accumulates fields and produces an immutable
//!   [`AccessKey`] on [`build`](AccessKeyBuilder::build). Each setter consumes
//!   the builder, so two builds never share mutable state.
//! - [`AccessKey::parse`] validates an existing 44-digit string.
//!
//! The two are inverses: `AccessKey::parse(key.as_str()) == Ok(key)`.
//!
//! ## Random code
//!
//! The 8-digit `cNF` field is drawn from the operating system CSPRNG. A
//! code equal to the last eight digits of the document number is rejected
//! by the authority, so generation retries until the two differ.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::KeyError;
use crate::model::{DocumentModel, EmissionType};
use crate::region::Region;
use crate::tax_id::IssuerId;

/// Length of an access key in digits.
pub const ACCESS_KEY_LEN: usize = 44;

/// Largest document number that fits the 9-digit field.
pub const MAX_DOCUMENT_NUMBER: u32 = 999_999_999;

/// Largest series that fits the 3-digit field.
pub const MAX_SERIES: u16 = 999;

const RANDOM_CODE_SPACE: u32 = 100_000_000;

/// Compute the mod-11 check digit of a digit string.
///
/// Digits are scanned right to left and multiplied by the weights
/// `2, 3, 4, 5, 6, 7, 8, 9`, wrapping back to 2 after 9. With
/// `r = sum % 11`, the check digit is `0` when `r < 2`, otherwise `11 - r`.
///
/// Because remainders 0 and 1 both map to digit 0, a key whose check digit
/// is 0 can, in rare cases, survive a single-digit corruption. Keys with any
/// other check digit detect every single-digit change.
///
/// # Errors
///
/// [`KeyError::MalformedKey`] if the input contains a non-digit.
pub fn mod11_check_digit(digits: &str) -> Result<u8, KeyError> {
    let mut weight = 2u32;
    let mut sum = 0u32;
    for byte in digits.bytes().rev() {
        if !byte.is_ascii_digit() {
            return Err(KeyError::MalformedKey {
                reason: format!("non-digit character {:?}", byte as char),
            });
        }
        sum += u32::from(byte - b'0') * weight;
        weight = if weight == 9 { 2 } else { weight + 1 };
    }
    let remainder = sum % 11;
    Ok(if remainder < 2 { 0 } else { (11 - remainder) as u8 })
}

// ─── AccessKey ───────────────────────────────────────────────────────

/// A validated 44-digit access key.
///
/// Holds the digit string plus the decoded fields. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey {
    digits: String,
    region: Region,
    model: DocumentModel,
    series: u16,
    number: u32,
    emission_type: EmissionType,
}

impl AccessKey {
    /// Start a builder.
    pub fn builder() -> AccessKeyBuilder {
        AccessKeyBuilder::default()
    }

    /// Parse and validate a 44-digit key.
    ///
    /// The check digit is verified before the coded fields are decoded, so
    /// any corruption that breaks the checksum is reported as
    /// [`KeyError::ChecksumMismatch`].
    ///
    /// # Errors
    ///
    /// - [`KeyError::MalformedKey`] if the length is not 44, a non-digit is
    ///   present, or the region/model/emission field does not decode.
    /// - [`KeyError::ChecksumMismatch`] if the check digit is wrong.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        if input.len() != ACCESS_KEY_LEN || !input.bytes().all(|b| b.is_ascii_digit()) {
            let chars = input.chars().count();
            let reason = if chars != ACCESS_KEY_LEN {
                format!("expected {ACCESS_KEY_LEN} digits, got {chars} characters")
            } else {
                "key must contain only ASCII digits".to_string()
            };
            return Err(KeyError::MalformedKey { reason });
        }

        let expected = mod11_check_digit(&input[..ACCESS_KEY_LEN - 1])?;
        let found = input.as_bytes()[ACCESS_KEY_LEN - 1] - b'0';
        if expected != found {
            return Err(KeyError::ChecksumMismatch { expected, found });
        }

        let region = Region::from_code(digit_field(input, 0, 2))
            .map_err(|e| KeyError::MalformedKey { reason: e.to_string() })?;
        let model = DocumentModel::from_code(digit_field(input, 20, 22))
            .map_err(|e| KeyError::MalformedKey { reason: e.to_string() })?;
        let emission_type = EmissionType::from_code(digit_field(input, 34, 35))
            .map_err(|e| KeyError::MalformedKey { reason: e.to_string() })?;
        let month = digit_field(input, 4, 6);
        if !(1..=12).contains(&month) {
            return Err(KeyError::MalformedKey {
                reason: format!("issue month {month:02} out of range"),
            });
        }

        Ok(Self {
            digits: input.to_string(),
            region,
            model,
            series: numeric_field(input, 22, 25) as u16,
            number: numeric_field(input, 25, 34),
            emission_type,
        })
    }

    /// The key as its 44-digit string.
    pub fn as_str(&self) -> &str {
        &self.digits
    }

    /// Issuing region (`cUF`).
    pub fn region(&self) -> Region {
        self.region
    }

    /// Issue period as `YYMM`.
    pub fn issue_period(&self) -> &str {
        &self.digits[2..6]
    }

    /// Two-digit year of issue.
    pub fn issue_year(&self) -> &str {
        &self.digits[2..4]
    }

    /// Issuer tax id as the 14-digit field (CPFs carry leading zeros).
    pub fn issuer(&self) -> &str {
        &self.digits[6..20]
    }

    /// Document model.
    pub fn model(&self) -> DocumentModel {
        self.model
    }

    /// Document series.
    pub fn series(&self) -> u16 {
        self.series
    }

    /// Document number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Emission type.
    pub fn emission_type(&self) -> EmissionType {
        self.emission_type
    }

    /// The 8-digit random code (`cNF`).
    pub fn random_code(&self) -> &str {
        &self.digits[35..43]
    }

    /// The check digit (`cDV`).
    pub fn check_digit(&self) -> u8 {
        self.digits.as_bytes()[ACCESS_KEY_LEN - 1] - b'0'
    }
}

/// Numeric value of `input[start..end]`; callers have verified all digits.
fn digit_field(input: &str, start: usize, end: usize) -> u8 {
    input.as_bytes()[start..end]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_mul(10).wrapping_add(b - b'0'))
}

/// Value of an all-digit field of at most 9 digits.
fn numeric_field(input: &str, start: usize, end: usize) -> u32 {
    input.as_bytes()[start..end]
        .iter()
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

impl FromStr for AccessKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for AccessKey {
    fn as_ref(&self) -> &str {
        &self.digits
    }
}

impl Serialize for AccessKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.digits)
    }
}

impl<'de> Deserialize<'de> for AccessKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ─── Builder ─────────────────────────────────────────────────────────

/// Accumulates access key fields and produces an [`AccessKey`].
///
/// Required: region, issuer, model, series, number, and either an issue
/// date or an explicit `YYMM`. Emission type defaults to
/// [`EmissionType::Normal`]; the random code is generated when unset.
#[derive(Debug, Clone, Default)]
pub struct AccessKeyBuilder {
    region: Option<Region>,
    issuer: Option<String>,
    model: Option<DocumentModel>,
    series: Option<u16>,
    number: Option<u32>,
    emission_type: Option<EmissionType>,
    issue_date: Option<NaiveDate>,
    issue_period: Option<String>,
    random_code: Option<String>,
}

impl AccessKeyBuilder {
    /// Issuing region.
    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Issuer CNPJ or CPF; punctuation is accepted.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Document model.
    pub fn model(mut self, model: DocumentModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Document series, 0..=999.
    pub fn series(mut self, series: u16) -> Self {
        self.series = Some(series);
        self
    }

    /// Document number, 1..=999,999,999.
    pub fn number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    /// Emission type.
    pub fn emission_type(mut self, emission_type: EmissionType) -> Self {
        self.emission_type = Some(emission_type);
        self
    }

    /// Issue date; the `YYMM` field is derived from it.
    pub fn issue_date(mut self, date: NaiveDate) -> Self {
        self.issue_date = Some(date);
        self
    }

    /// Explicit `YYMM` issue period. Takes precedence over the issue date.
    pub fn issue_period(mut self, yymm: impl Into<String>) -> Self {
        self.issue_period = Some(yymm.into());
        self
    }

    /// Explicit 8-digit random code. Shorter numeric codes are zero-padded.
    pub fn random_code(mut self, code: impl Into<String>) -> Self {
        self.random_code = Some(code.into());
        self
    }

    /// Build the key, drawing the random code from the OS CSPRNG if unset.
    ///
    /// # Errors
    ///
    /// [`KeyError::InvalidField`] when a required field is missing or a value
    /// does not fit its fixed width.
    pub fn build(self) -> Result<AccessKey, KeyError> {
        self.build_with_rng(&mut OsRng)
    }

    /// Build the key using the supplied cryptographic RNG for the random code.
    pub fn build_with_rng<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<AccessKey, KeyError> {
        let region = self.region.ok_or_else(|| missing("region"))?;
        let model = self.model.ok_or_else(|| missing("model"))?;
        let emission_type = self.emission_type.unwrap_or(EmissionType::Normal);

        let issuer_raw = self.issuer.ok_or_else(|| missing("issuer"))?;
        let issuer = IssuerId::new(&issuer_raw).map_err(|e| KeyError::InvalidField {
            field: "issuer",
            reason: e.to_string(),
        })?;

        let series = self.series.ok_or_else(|| missing("series"))?;
        if series > MAX_SERIES {
            return Err(KeyError::InvalidField {
                field: "series",
                reason: format!("{series} does not fit 3 digits"),
            });
        }

        let number = self.number.ok_or_else(|| missing("number"))?;
        if number == 0 || number > MAX_DOCUMENT_NUMBER {
            return Err(KeyError::InvalidField {
                field: "number",
                reason: format!("{number} outside 1..={MAX_DOCUMENT_NUMBER}"),
            });
        }
        let number_str = format!("{number:09}");

        let period = match (self.issue_period, self.issue_date) {
            (Some(yymm), _) => validate_period(yymm)?,
            (None, Some(date)) => format!("{:02}{:02}", date.year().rem_euclid(100), date.month()),
            (None, None) => return Err(missing("issue_date")),
        };

        let number_suffix = &number_str[1..];
        let random_code = match self.random_code {
            Some(code) => {
                let code = validate_random_code(code)?;
                if code == number_suffix {
                    return Err(KeyError::InvalidField {
                        field: "random_code",
                        reason: "must differ from the last 8 digits of the number".into(),
                    });
                }
                code
            }
            None => generate_random_code(number_suffix, rng),
        };

        let mut digits = String::with_capacity(ACCESS_KEY_LEN);
        digits.push_str(&region.code_str());
        digits.push_str(&period);
        digits.push_str(&issuer.padded());
        digits.push_str(&format!("{:02}", model.code()));
        digits.push_str(&format!("{series:03}"));
        digits.push_str(&number_str);
        digits.push_str(&emission_type.code().to_string());
        digits.push_str(&random_code);
        let check = mod11_check_digit(&digits)?;
        digits.push(char::from(b'0' + check));

        Ok(AccessKey {
            digits,
            region,
            model,
            series,
            number,
            emission_type,
        })
    }
}

fn missing(field: &'static str) -> KeyError {
    KeyError::InvalidField {
        field,
        reason: "value is required".into(),
    }
}

fn validate_period(yymm: String) -> Result<String, KeyError> {
    let trimmed = yymm.trim();
    if trimmed.len() != 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::InvalidField {
            field: "issue_period",
            reason: format!("{yymm:?} is not YYMM"),
        });
    }
    let month: u8 = trimmed[2..].parse().unwrap_or(0);
    if !(1..=12).contains(&month) {
        return Err(KeyError::InvalidField {
            field: "issue_period",
            reason: format!("month {month:02} out of range"),
        });
    }
    Ok(trimmed.to_string())
}

fn validate_random_code(code: String) -> Result<String, KeyError> {
    let trimmed = code.trim();
    if trimmed.is_empty() || trimmed.len() > 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::InvalidField {
            field: "random_code",
            reason: format!("{code:?} is not an 8-digit code"),
        });
    }
    Ok(format!("{trimmed:0>8}"))
}

fn generate_random_code<R: RngCore + CryptoRng>(number_suffix: &str, rng: &mut R) -> String {
    loop {
        let candidate = format!("{:08}", rng.gen_range(0..RANDOM_CODE_SPACE));
        if candidate != number_suffix {
            return candidate;
        }
    }
}
