//! # Authority Status Codes
//!
//! Every authority response carries a numeric status (`cStat`) and a
//! free-text reason (`xMotivo`). The core consumes these codes; it never
//! generates them. This module maps the codes the core acts on to a closed
//! enum with a fixed description table, so callers and UIs can present a
//! stable message regardless of the wording the authority returns.
//!
//! Codes outside the table decode to [`AuthorityStatus::Unknown`], keeping the
//! raw value. Nothing is silently mapped to a neighbouring status.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! statuses {
    ($( $variant:ident = $code:literal => $desc:literal ),+ $(,)?) => {
        /// A status code returned by the authority.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AuthorityStatus {
            $(
                #[doc = $desc]
                $variant,
            )+
            /// A code this table does not map.
            Unknown(u16),
        }

        impl AuthorityStatus {
            /// Decode a numeric `cStat`.
            pub fn from_code(code: u16) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    other => Self::Unknown(other),
                }
            }

            /// The numeric `cStat`.
            pub fn code(self) -> u16 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Unknown(code) => code,
                }
            }

            /// Fixed human-readable description.
            pub fn description(self) -> &'static str {
                match self {
                    $(Self::$variant => $desc,)+
                    Self::Unknown(_) => "Código de status não catalogado",
                }
            }
        }
    };
}

statuses! {
    Authorized = 100 => "Autorizado o uso da NF-e",
    CancellationHomologated = 101 => "Cancelamento de NF-e homologado",
    InvalidationHomologated = 102 => "Inutilização de número homologado",
    BatchReceived = 103 => "Lote recebido com sucesso",
    BatchProcessed = 104 => "Lote processado",
    BatchInProgress = 105 => "Lote em processamento",
    BatchNotFound = 106 => "Lote não localizado",
    ServiceRunning = 107 => "Serviço em operação",
    ServicePausedBriefly = 108 => "Serviço paralisado momentaneamente (curto prazo)",
    ServicePaused = 109 => "Serviço paralisado sem previsão",
    UsageDenied = 110 => "Uso denegado",
    EventBatchProcessed = 128 => "Lote de evento processado",
    EventRegisteredLinked = 135 => "Evento registrado e vinculado a NF-e",
    EventRegisteredUnlinked = 136 => "Evento registrado, mas não vinculado a NF-e",
    AuthorizedLate = 150 => "Autorizado o uso da NF-e, autorização fora de prazo",
    CancellationHomologatedLate = 155 => "Cancelamento de NF-e homologado fora de prazo",
    DuplicateDocument = 204 => "Rejeição: duplicidade de NF-e",
    DocumentNotFound = 217 => "Rejeição: NF-e não consta na base de dados da SEFAZ",
    AlreadyCancelled = 218 => "Rejeição: NF-e já está cancelada na base de dados da SEFAZ",
    RangeNumberUsed = 241 => "Rejeição: um número da faixa já foi utilizado",
    RangeNumberInvalidated = 256 => "Rejeição: uma NF-e da faixa já está inutilizada na base de dados da SEFAZ",
    TargetNotFound = 494 => "Rejeição: chave de acesso inexistente",
    DeadlineExceeded = 501 => "Rejeição: prazo de cancelamento superior ao previsto na legislação",
    DuplicateEvent = 573 => "Rejeição: duplicidade de evento",
    TargetNotAuthorized = 580 => "Rejeição: o evento exige uma NF-e autorizada",
    SequenceExceeded = 594 => "Rejeição: o número de sequência do evento é maior que o permitido",
    CorrectionTextRejected = 597 => "Rejeição: texto da carta de correção inválido",
    ImproperUsage = 656 => "Rejeição: consumo indevido",
    Uncatalogued = 999 => "Rejeição: erro não catalogado",
}

impl AuthorityStatus {
    /// The event was registered (linked, unlinked, or late cancellation).
    pub fn is_event_registered(self) -> bool {
        matches!(
            self,
            Self::EventRegisteredLinked
                | Self::EventRegisteredUnlinked
                | Self::CancellationHomologatedLate
        )
    }

    /// The document was authorized for use.
    pub fn is_authorized(self) -> bool {
        matches!(self, Self::Authorized | Self::AuthorizedLate)
    }

    /// Use of the document was denied; the number is consumed.
    pub fn is_denied(self) -> bool {
        matches!(self, Self::UsageDenied)
    }

    /// The batch was accepted but its items have not been decided yet.
    pub fn is_batch_pending(self) -> bool {
        matches!(self, Self::BatchReceived | Self::BatchInProgress)
    }

    /// The authority reports its service as running.
    pub fn is_service_available(self) -> bool {
        matches!(self, Self::ServiceRunning)
    }

    /// The code is not in the local table.
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for AuthorityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.code(), self.description())
    }
}

impl Serialize for AuthorityStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl<'de> Deserialize<'de> for AuthorityStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u16::deserialize(deserializer).map(Self::from_code)
    }
}
