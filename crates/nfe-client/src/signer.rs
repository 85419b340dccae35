//! # Signing Boundary
//!
//! XML signature mechanics live outside this workspace. The client hands an
//! unsigned message to a [`DocumentSigner`] and receives the same document
//! back with an enveloped signature referencing the element's `Id`.
//!
//! ## Contract
//!
//! - Input: a well-formed message whose signable element carries
//!   `Id="{reference_id}"`.
//! - Output: the same document with a `Signature` element whose
//!   `Reference` points at `#{reference_id}`.
//!
//! [`ensure_signed`] checks the output shape before anything is sent, so a
//! signer that returns its input untouched fails locally.

use thiserror::Error;

/// Errors from a signing backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    /// The backend could not produce a signature.
    #[error("signing failed with {provider}: {reason}")]
    Failed {
        /// Backend name.
        provider: String,
        /// Backend message.
        reason: String,
    },

    /// The input has no element with the requested `Id`.
    #[error("no element with Id {reference_id} to sign")]
    MissingReference {
        /// Requested `Id`.
        reference_id: String,
    },

    /// The backend returned a document without a usable signature.
    #[error("signed output for {reference_id} is malformed: {reason}")]
    MalformedOutput {
        /// Requested `Id`.
        reference_id: String,
        /// What is missing.
        reason: &'static str,
    },
}

/// Produces enveloped XML signatures.
///
/// Implementations must be `Send + Sync`; one signer is shared by every
/// call a client makes.
pub trait DocumentSigner: Send + Sync {
    /// Sign the element of `xml` whose `Id` is `reference_id`.
    fn sign(&self, xml: &str, reference_id: &str) -> Result<String, SignError>;

    /// Backend name for diagnostics.
    fn provider_name(&self) -> &str;
}

/// Reject `xml` unless it carries an element with `Id="{reference_id}"`.
pub fn ensure_reference(xml: &str, reference_id: &str) -> Result<(), SignError> {
    if xml.contains(&format!("Id=\"{reference_id}\"")) {
        Ok(())
    } else {
        Err(SignError::MissingReference {
            reference_id: reference_id.to_string(),
        })
    }
}

/// Reject signer output that lacks a signature over `#{reference_id}`.
pub fn ensure_signed(xml: &str, reference_id: &str) -> Result<(), SignError> {
    let malformed = |reason| SignError::MalformedOutput {
        reference_id: reference_id.to_string(),
        reason,
    };
    if !has_element(xml, "Signature") {
        return Err(malformed("no Signature element"));
    }
    if !xml.contains(&format!("URI=\"#{reference_id}\"")) {
        return Err(malformed("no Reference to the signed element"));
    }
    ensure_reference(xml, reference_id)
}

fn has_element(xml: &str, name: &str) -> bool {
    xml.match_indices('<').any(|(i, _)| {
        let rest = &xml[i + 1..];
        let tag = rest
            .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .next()
            .unwrap_or_default();
        tag.rsplit(':').next() == Some(name)
    })
}
