//! # Error Types — Identity Layer
//!
//! Errors raised while building, parsing, or decoding document identity.
//! All of them are local, never retried, and fatal to the operation that
//! produced them.

use thiserror::Error;

/// Errors from the access key codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A builder field is missing, empty, or the wrong width after padding.
    #[error("invalid access key field `{field}`: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The input is not 44 ASCII digits, or one of its coded fields does
    /// not decode.
    #[error("malformed access key: {reason}")]
    MalformedKey {
        /// Description of the structural failure.
        reason: String,
    },

    /// The 44th digit does not match the mod-11 digit of the first 43.
    #[error("access key check digit mismatch: computed {expected}, key carries {found}")]
    ChecksumMismatch {
        /// Check digit recomputed from the 43-digit prefix.
        expected: u8,
        /// Check digit present in the input.
        found: u8,
    },
}

/// Errors from decoding the closed code sets and identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No federative unit has this code or abbreviation.
    #[error("unknown region: {0:?}")]
    UnknownRegion(String),

    /// The document model code is neither 55 nor 65.
    #[error("unknown document model: {0:?}")]
    UnknownModel(String),

    /// The environment code is neither 1 nor 2.
    #[error("unknown environment code: {0:?}")]
    UnknownEnvironment(String),

    /// The emission type digit is not one the authority defines.
    #[error("unknown emission type: {0:?}")]
    UnknownEmissionType(String),

    /// Issuer tax id is not an 11-digit CPF or 14-digit CNPJ.
    #[error("invalid issuer tax id: {0:?}")]
    InvalidTaxId(String),

    /// Timestamp or UTC offset could not be parsed.
    #[error("invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        input: String,
        /// Parser diagnostics.
        reason: String,
    },
}
