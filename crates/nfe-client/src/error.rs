//! Orchestrator errors.
//!
//! [`ClientError`] composes the per-crate errors. Local failures (config,
//! key, event, resolve, sign) are raised before any request leaves the
//! process; [`ClientError::Transport`] and [`ClientError::AuthorityRejected`]
//! come back from the authority.

use nfe_core::{AuthorityStatus, KeyError};
use nfe_events::EventError;
use nfe_transport::{ContingencyError, ResolveError, TransportError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::signer::SignError;

/// Errors from [`crate::DocumentClient`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed access key.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The event failed local validation or rendering.
    #[error(transparent)]
    Event(#[from] EventError),

    /// No endpoint for the request.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Delivery failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The signing backend failed or returned an unusable document.
    #[error(transparent)]
    Sign(#[from] SignError),

    /// A request argument failed a format rule.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// Argument or element name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Contingency state change refused.
    #[error(transparent)]
    Contingency(#[from] ContingencyError),

    /// The authority answered with a status that is not a success for the
    /// operation.
    #[error("authority rejected the request: {status} ({message})")]
    AuthorityRejected {
        /// Decoded `cStat`.
        status: AuthorityStatus,
        /// `xMotivo`, verbatim.
        message: String,
    },

    /// A required part of the response is absent.
    #[error("incomplete authority response: {reason}")]
    IncompleteResponse {
        /// What was expected.
        reason: String,
    },
}

impl ClientError {
    /// The error happened before anything was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Key(_)
                | Self::Event(_)
                | Self::Resolve(_)
                | Self::Sign(_)
                | Self::InvalidInput { .. }
                | Self::Contingency(_)
        )
    }

    /// Resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let local: ClientError = EventError::InvalidRange {
            reason: "start after end".into(),
        }
        .into();
        assert!(local.is_local());
        assert!(!local.is_retryable());

        let transient: ClientError = TransportError::Timeout {
            attempts: 3,
            elapsed_ms: 90_000,
            last_cause: None,
        }
        .into();
        assert!(!transient.is_local());
        assert!(transient.is_retryable());

        let rejected = ClientError::AuthorityRejected {
            status: AuthorityStatus::from_code(573),
            message: "Rejeicao: Duplicidade de evento".into(),
        };
        assert!(!rejected.is_local());
        assert!(!rejected.is_retryable());
        assert!(rejected.to_string().contains("573"));
    }
}
