//! Transport-layer error types.
//!
//! Three families, by how a caller reacts to them:
//!
//! - [`ResolveError`]: configuration-level, fatal, surfaced before any I/O.
//! - [`TransportError`]: the call itself. Only [`TransportError::is_transient`]
//!   variants are retried.
//! - [`ContingencyError`]: misuse of the contingency flag.

use nfe_core::{DocumentModel, Environment, Region};
use nfe_events::EventError;
use thiserror::Error;

use crate::contingency::ContingencyMode;
use crate::endpoint::ServiceKind;

/// Endpoint resolution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No source in the chain maps this region.
    #[error("no endpoint source knows region {region}")]
    UnknownRegion {
        /// The requested region.
        region: Region,
    },

    /// The region is mapped, but not for this service and model.
    #[error("{service} is not offered for model {model} in {region} ({environment})")]
    UnsupportedServiceForModel {
        /// The requested region.
        region: Region,
        /// The requested model.
        model: DocumentModel,
        /// The requested service.
        service: ServiceKind,
        /// The requested environment.
        environment: Environment,
    },

    /// An endpoint table failed to load.
    #[error("invalid endpoint table: {reason}")]
    InvalidTable {
        /// Parser or validation message.
        reason: String,
    },
}

/// Failures of a single remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be built from its configuration.
    #[error("transport configuration error: {reason}")]
    Config {
        /// What is missing or invalid.
        reason: String,
    },

    /// The request timed out, the per-call deadline elapsed, or the retry
    /// budget ran out on transient failures.
    #[error(
        "request timed out after {attempts} attempt(s), {elapsed_ms}ms elapsed{}",
        cause_suffix(.last_cause)
    )]
    Timeout {
        /// Attempts made, including the first.
        attempts: u32,
        /// Wall time spent on the call.
        elapsed_ms: u64,
        /// The last transient failure seen, if any.
        last_cause: Option<String>,
    },

    /// The connection could not be established or was reset.
    #[error("connection failure after {attempts} attempt(s): {reason}")]
    ConnectionFailure {
        /// Attempts made, including the first.
        attempts: u32,
        /// Underlying client message.
        reason: String,
    },

    /// A gateway in front of the authority answered 502, 503, or 504.
    #[error("service unavailable (HTTP {status}) after {attempts} attempt(s)")]
    ServiceUnavailable {
        /// HTTP status.
        status: u16,
        /// Attempts made, including the first.
        attempts: u32,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status.
        status: u16,
        /// Response body excerpt.
        body: String,
    },

    /// The authority answered with a SOAP fault.
    #[error("SOAP fault {code}: {reason}")]
    SoapFault {
        /// Fault code.
        code: String,
        /// Fault reason text.
        reason: String,
    },

    /// The response matched neither the bare nor the wrapped shape.
    #[error("unparsable response: {reason}")]
    UnparsableResponse {
        /// Decoder message.
        reason: String,
        /// Start of the offending payload.
        excerpt: String,
    },

    /// The caller's cancellation token fired.
    #[error("call cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
}

impl TransportError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionFailure { .. } | Self::ServiceUnavailable { .. }
        )
    }

    /// Collapse a transient failure that exhausted the retry budget into
    /// [`TransportError::Timeout`]. Other variants pass through.
    pub(crate) fn exhausted(self, attempts: u32, elapsed_ms: u64) -> Self {
        let last_cause = match self {
            Self::Timeout { last_cause, .. } => last_cause,
            Self::ConnectionFailure { .. } | Self::ServiceUnavailable { .. } => {
                Some(self.to_string())
            }
            other => return other,
        };
        Self::Timeout {
            attempts,
            elapsed_ms,
            last_cause,
        }
    }
}

fn cause_suffix(cause: &Option<String>) -> String {
    cause.as_deref().map(|c| format!(" (last: {c})")).unwrap_or_default()
}

/// Contingency flag misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContingencyError {
    /// Activation requested while a mode is already active.
    #[error("contingency already active in mode {mode}")]
    AlreadyActive {
        /// The mode currently active.
        mode: ContingencyMode,
    },

    /// Deactivation requested while inactive.
    #[error("contingency is not active")]
    NotActive,

    /// The activation reason failed text validation.
    #[error("invalid contingency reason: {0}")]
    InvalidReason(#[from] EventError),

    /// Persisted state could not be read or written.
    #[error("contingency state serialization failed: {reason}")]
    Serialization {
        /// serde_json message.
        reason: String,
    },
}
