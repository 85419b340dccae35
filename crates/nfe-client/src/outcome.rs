//! Results of client operations.

use nfe_core::{AccessKey, AuthorityStatus, EventTimestamp};
use nfe_transport::{
    AuthorityReply, AuthorizationResponse, AuthorizationResultResponse, ProtocolInfo,
};
use serde::Serialize;

/// Verdict on a submitted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AuthorizationOutcome {
    /// Authorized for use (100, 150).
    Authorized(ProtocolInfo),
    /// Use denied (110); the number is consumed.
    Denied(ProtocolInfo),
    /// Rejected at batch or document level. The document may be fixed and
    /// resubmitted.
    Rejected {
        /// Decoded `cStat`.
        status: AuthorityStatus,
        /// `xMotivo`.
        message: String,
    },
    /// The batch was accepted but no verdict is available yet. Query again
    /// with the receipt, or by key when there is none.
    Pending {
        /// `nRec`, when the authority issued one.
        receipt: Option<String>,
    },
}

impl AuthorizationOutcome {
    /// Whether the authority reached a final verdict on the document.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Authorized(_) | Self::Denied(_))
    }

    /// `nProt` of an authorization or denial.
    pub fn protocol_number(&self) -> Option<&str> {
        match self {
            Self::Authorized(info) | Self::Denied(info) => info.protocol.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn from_submission(response: AuthorizationResponse) -> Self {
        let status = response.status();
        if let Some(protocol) = response.protocol {
            return verdict(protocol.info);
        }
        if status.is_batch_pending() || status == AuthorityStatus::BatchProcessed {
            return Self::Pending {
                receipt: response.receipt.map(|r| r.receipt),
            };
        }
        Self::Rejected {
            status,
            message: response.message,
        }
    }

    pub(crate) fn from_result(receipt: &str, response: AuthorizationResultResponse) -> Self {
        let status = response.status();
        match status {
            AuthorityStatus::BatchProcessed => match response.protocols.into_iter().next() {
                Some(protocol) => verdict(protocol.info),
                None => Self::Pending {
                    receipt: Some(receipt.to_string()),
                },
            },
            s if s.is_batch_pending() => Self::Pending {
                receipt: Some(receipt.to_string()),
            },
            _ => Self::Rejected {
                status,
                message: response.message,
            },
        }
    }
}

fn verdict(info: ProtocolInfo) -> AuthorizationOutcome {
    let status = info.status();
    if status.is_authorized() {
        AuthorizationOutcome::Authorized(info)
    } else if status.is_denied() {
        AuthorizationOutcome::Denied(info)
    } else {
        AuthorizationOutcome::Rejected {
            status,
            message: info.message,
        }
    }
}

/// A registered correction letter or cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventReceipt {
    /// Target document.
    pub key: AccessKey,
    /// `nSeqEvento`.
    pub sequence: u32,
    /// 135, 136, or 155.
    pub status: AuthorityStatus,
    /// `xMotivo`.
    pub message: String,
    /// `nProt` of the registration.
    pub protocol: Option<String>,
    /// `dhRegEvento`, or the submission instant when absent.
    pub registered_at: EventTimestamp,
}

/// A homologated number invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReceipt {
    /// Always 102.
    pub status: AuthorityStatus,
    /// `xMotivo`.
    pub message: String,
    /// `nProt`.
    pub protocol: Option<String>,
    /// `dhRecbto`.
    pub received_at: Option<String>,
}
