//! # Event Message Rendering
//!
//! Turns a validated [`FiscalEvent`] into the unsigned XML the issuer signs
//! and submits.
//!
//! ## Shapes
//!
//! ```text
//! envEvento (versao 1.00)            inutNFe (versao 4.00)
//! ├── idLote                         └── infInut Id=request_id
//! └── evento (versao 1.00)               ├── tpAmb, xServ=INUTILIZAR
//!     └── infEvento Id=…                 ├── cUF, ano, CNPJ|CPF, mod, serie
//!         ├── cOrgao, tpAmb, CNPJ|CPF    ├── nNFIni, nNFFin
//!         ├── chNFe, dhEvento            └── xJust
//!         ├── tpEvento, nSeqEvento
//!         ├── verEvento
//!         └── detEvento (versao 1.00)
//! ```
//!
//! The builder renders one `evento`. The signer adds the signature over the
//! `infEvento` id, and [`wrap_event_batch`] places signed events into the
//! `envEvento` batch.

use chrono::FixedOffset;
use nfe_core::{AccessKey, Environment, EventTimestamp, IssuerId, Region};
use serde::Serialize;

use crate::error::EventError;
use crate::event::{EventType, FiscalEvent, NumberInvalidation};
use crate::xml::XmlWriter;

/// Namespace of every fiscal document element.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Schema version of `envEvento` and `evento`.
pub const EVENT_SCHEMA_VERSION: &str = "1.00";

/// Schema version of `inutNFe`.
pub const INVALIDATION_SCHEMA_VERSION: &str = "4.00";

/// Maximum events in one `envEvento` batch.
pub const MAX_EVENTS_PER_BATCH: usize = 20;

/// Largest lot id (`idLote` is up to 15 digits).
pub const MAX_LOT_ID: u64 = 999_999_999_999_999;

/// Author type for cancellation by substitution: the issuer itself.
const AUTHOR_TYPE_ISSUER: &str = "1";

// ─── Context ─────────────────────────────────────────────────────────

/// Per-submission values shared by every event the builder renders.
#[derive(Debug, Clone)]
pub struct EventContext {
    /// Issuer of the target documents.
    pub issuer: IssuerId,
    /// Target environment.
    pub environment: Environment,
    /// Organ code override. Defaults to the key's region.
    pub region_override: Option<Region>,
    /// Event instant; rendered with its offset. `None` means "now" at each
    /// build.
    pub timestamp: Option<EventTimestamp>,
    /// Offset for the current time when `timestamp` is unset.
    pub offset: FixedOffset,
}

impl EventContext {
    /// Context for `issuer` in `environment` at `timestamp`.
    pub fn new(issuer: IssuerId, environment: Environment, timestamp: EventTimestamp) -> Self {
        Self {
            issuer,
            environment,
            region_override: None,
            timestamp: Some(timestamp),
            offset: timestamp.offset(),
        }
    }

    /// Context that stamps each event with the current time in `offset`.
    pub fn current(issuer: IssuerId, environment: Environment, offset: FixedOffset) -> Self {
        Self {
            issuer,
            environment,
            region_override: None,
            timestamp: None,
            offset,
        }
    }

    /// The instant to render: the fixed timestamp, or now.
    pub fn instant(&self) -> EventTimestamp {
        self.timestamp.unwrap_or_else(|| EventTimestamp::now_in(self.offset))
    }

    /// Address events to `region` instead of the key's region.
    pub fn with_region_override(mut self, region: Region) -> Self {
        self.region_override = Some(region);
        self
    }
}

// ─── Messages ────────────────────────────────────────────────────────

/// Event-specific `detEvento` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventDetail {
    /// Correction letter text and usage conditions.
    Correction {
        /// `xCorrecao`.
        text: String,
        /// `xCondUso`.
        conditions_of_use: String,
    },
    /// Plain cancellation.
    Cancellation {
        /// Authorization protocol of the target.
        protocol: String,
        /// `xJust`.
        justification: String,
    },
    /// Cancellation of a consumer invoice replaced by another.
    Substitution {
        /// Region of the author.
        author_region: Region,
        /// `verAplic`.
        app_version: String,
        /// Authorization protocol of the target.
        protocol: String,
        /// `xJust`.
        justification: String,
        /// Key of the replacing document.
        replacing_key: AccessKey,
    },
}

/// A rendered-ready event, before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMessage {
    /// `infEvento@Id`: `"ID" + tpEvento + chNFe + nSeqEvento(2)`.
    pub id: String,
    /// Receiving organ.
    pub organ: Region,
    /// Target environment.
    pub environment: Environment,
    /// Issuer.
    pub issuer: IssuerId,
    /// Target document.
    pub key: AccessKey,
    /// Event instant.
    pub timestamp: EventTimestamp,
    /// Wire event type.
    pub event_type: EventType,
    /// Sequence number.
    pub sequence: u32,
    /// Event payload.
    pub detail: EventDetail,
}

impl EventMessage {
    /// `evento` element, unsigned.
    pub fn to_xml(&self) -> Result<String, EventError> {
        let mut w = XmlWriter::new();
        w.open(
            "evento",
            &[("xmlns", NFE_NAMESPACE), ("versao", EVENT_SCHEMA_VERSION)],
        )?;
        w.open("infEvento", &[("Id", self.id.as_str())])?;
        w.leaf("cOrgao", &self.organ.code_str())?;
        w.leaf("tpAmb", &self.environment.code().to_string())?;
        w.leaf(self.issuer.tag(), self.issuer.as_str())?;
        w.leaf("chNFe", self.key.as_str())?;
        w.leaf("dhEvento", &self.timestamp.to_authority_string())?;
        w.leaf("tpEvento", &self.event_type.code().to_string())?;
        w.leaf("nSeqEvento", &self.sequence.to_string())?;
        w.leaf("verEvento", self.event_type.version())?;
        w.open("detEvento", &[("versao", self.event_type.version())])?;
        w.leaf("descEvento", self.event_type.description())?;
        match &self.detail {
            EventDetail::Correction {
                text,
                conditions_of_use,
            } => {
                w.leaf("xCorrecao", text)?;
                w.leaf("xCondUso", conditions_of_use)?;
            }
            EventDetail::Cancellation {
                protocol,
                justification,
            } => {
                w.leaf("nProt", protocol)?;
                w.leaf("xJust", justification)?;
            }
            EventDetail::Substitution {
                author_region,
                app_version,
                protocol,
                justification,
                replacing_key,
            } => {
                w.leaf("cOrgaoAutor", &author_region.code_str())?;
                w.leaf("tpAutor", AUTHOR_TYPE_ISSUER)?;
                w.leaf("verAplic", app_version)?;
                w.leaf("nProt", protocol)?;
                w.leaf("xJust", justification)?;
                w.leaf("chNFeRef", replacing_key.as_str())?;
            }
        }
        w.close("detEvento")?;
        w.close("infEvento")?;
        w.close("evento")?;
        w.finish()
    }
}

/// A rendered-ready number invalidation, before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationMessage {
    /// `infInut@Id`.
    pub id: String,
    /// Target environment.
    pub environment: Environment,
    /// The validated request.
    pub request: NumberInvalidation,
}

impl InvalidationMessage {
    /// `inutNFe` element, unsigned.
    pub fn to_xml(&self) -> Result<String, EventError> {
        let r = &self.request;
        let mut w = XmlWriter::new();
        w.open(
            "inutNFe",
            &[("xmlns", NFE_NAMESPACE), ("versao", INVALIDATION_SCHEMA_VERSION)],
        )?;
        w.open("infInut", &[("Id", self.id.as_str())])?;
        w.leaf("tpAmb", &self.environment.code().to_string())?;
        w.leaf("xServ", "INUTILIZAR")?;
        w.leaf("cUF", &r.region().code_str())?;
        w.leaf("ano", &format!("{:02}", r.year()))?;
        w.leaf(r.issuer().tag(), r.issuer().as_str())?;
        w.leaf("mod", &r.model().code().to_string())?;
        w.leaf("serie", &r.series().to_string())?;
        w.leaf("nNFIni", &r.start().to_string())?;
        w.leaf("nNFFin", &r.end().to_string())?;
        w.leaf("xJust", r.justification())?;
        w.close("infInut")?;
        w.close("inutNFe")?;
        w.finish()
    }
}

/// Output of [`EventMessageBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PreparedMessage {
    /// Correction or cancellation, sent through event reception.
    Event(EventMessage),
    /// Sent through the invalidation service.
    Invalidation(InvalidationMessage),
}

impl PreparedMessage {
    /// Id of the element the signature must reference.
    pub fn reference_id(&self) -> &str {
        match self {
            Self::Event(m) => &m.id,
            Self::Invalidation(m) => &m.id,
        }
    }

    /// Unsigned XML.
    pub fn to_xml(&self) -> Result<String, EventError> {
        match self {
            Self::Event(m) => m.to_xml(),
            Self::Invalidation(m) => m.to_xml(),
        }
    }
}

// ─── Builder ─────────────────────────────────────────────────────────

/// Renders validated events for one issuer.
#[derive(Debug, Clone)]
pub struct EventMessageBuilder {
    context: EventContext,
}

impl EventMessageBuilder {
    /// Builder bound to `context`.
    pub fn new(context: EventContext) -> Self {
        Self { context }
    }

    /// The context in use.
    pub fn context(&self) -> &EventContext {
        &self.context
    }

    /// Build the message for `event`.
    ///
    /// # Errors
    ///
    /// [`EventError::InvalidField`] when the event names a different issuer
    /// than the context.
    pub fn build(&self, event: &FiscalEvent) -> Result<PreparedMessage, EventError> {
        match event {
            FiscalEvent::CorrectionLetter(letter) => {
                let detail = EventDetail::Correction {
                    text: letter.text().to_string(),
                    conditions_of_use: letter.conditions_of_use().to_string(),
                };
                self.event_message(
                    letter.key(),
                    EventType::CorrectionLetter,
                    letter.sequence(),
                    detail,
                )
            }
            FiscalEvent::Cancellation(cancellation) => {
                let detail = match cancellation.substitution() {
                    Some(sub) => EventDetail::Substitution {
                        author_region: cancellation.key().region(),
                        app_version: sub.app_version.clone(),
                        protocol: cancellation.protocol().to_string(),
                        justification: cancellation.justification().to_string(),
                        replacing_key: sub.replacing_key.clone(),
                    },
                    None => EventDetail::Cancellation {
                        protocol: cancellation.protocol().to_string(),
                        justification: cancellation.justification().to_string(),
                    },
                };
                self.event_message(
                    cancellation.key(),
                    cancellation.event_type(),
                    cancellation.sequence(),
                    detail,
                )
            }
            FiscalEvent::NumberInvalidation(invalidation) => {
                if invalidation.issuer() != &self.context.issuer {
                    return Err(issuer_mismatch(
                        &self.context.issuer,
                        invalidation.issuer().as_str(),
                    ));
                }
                Ok(PreparedMessage::Invalidation(InvalidationMessage {
                    id: invalidation.request_id(),
                    environment: self.context.environment,
                    request: invalidation.clone(),
                }))
            }
        }
    }

    fn event_message(
        &self,
        key: &AccessKey,
        event_type: EventType,
        sequence: u32,
        detail: EventDetail,
    ) -> Result<PreparedMessage, EventError> {
        if key.issuer() != self.context.issuer.padded() {
            return Err(issuer_mismatch(&self.context.issuer, key.issuer()));
        }
        Ok(PreparedMessage::Event(EventMessage {
            id: event_id(event_type, key, sequence),
            organ: self.context.region_override.unwrap_or_else(|| key.region()),
            environment: self.context.environment,
            issuer: self.context.issuer.clone(),
            key: key.clone(),
            timestamp: self.context.instant(),
            event_type,
            sequence,
            detail,
        }))
    }
}

/// `"ID" + tpEvento + chNFe + nSeqEvento(2)`, 54 characters.
pub fn event_id(event_type: EventType, key: &AccessKey, sequence: u32) -> String {
    format!("ID{}{}{:02}", event_type.code(), key, sequence)
}

fn issuer_mismatch(expected: &IssuerId, got: &str) -> EventError {
    EventError::InvalidField {
        field: expected.tag(),
        reason: format!("event issuer {got} differs from configured issuer {expected}"),
    }
}

// ─── Batch ───────────────────────────────────────────────────────────

/// Place signed `evento` elements into an `envEvento` batch.
///
/// A leading XML declaration on each fragment is dropped.
///
/// # Errors
///
/// [`EventError::InvalidField`] when the batch is empty, holds more than
/// [`MAX_EVENTS_PER_BATCH`] events, or `lot_id` exceeds 15 digits.
pub fn wrap_event_batch<S: AsRef<str>>(
    lot_id: u64,
    signed_events: &[S],
) -> Result<String, EventError> {
    if signed_events.is_empty() || signed_events.len() > MAX_EVENTS_PER_BATCH {
        return Err(EventError::InvalidField {
            field: "evento",
            reason: format!(
                "batch holds {} events, allowed 1..={MAX_EVENTS_PER_BATCH}",
                signed_events.len()
            ),
        });
    }
    if lot_id > MAX_LOT_ID {
        return Err(EventError::InvalidField {
            field: "idLote",
            reason: format!("lot id {lot_id} exceeds 15 digits"),
        });
    }

    let mut w = XmlWriter::new();
    w.open(
        "envEvento",
        &[("xmlns", NFE_NAMESPACE), ("versao", EVENT_SCHEMA_VERSION)],
    )?;
    w.leaf("idLote", &lot_id.to_string())?;
    for event in signed_events {
        w.raw(strip_declaration(event.as_ref()))?;
    }
    w.close("envEvento")?;
    w.finish()
}

fn strip_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
