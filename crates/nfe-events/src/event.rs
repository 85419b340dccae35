//! # Fiscal Event Requests
//!
//! Validated constructors for the three post-authorization requests. A value
//! of any of these types has already passed every local rule: sequence
//! bounds, text length and content, range bounds, and key validity. Rules
//! that depend on the document's history (consecutive sequence, deadline,
//! current state) live in [`crate::lifecycle`].
//!
//! Correction letters may not touch the tax base, rates, quantities, the
//! identity of either party, or the issue date. Those restrictions are legal
//! ones, enforced by whoever composes the correction text; no semantic
//! diffing happens here.

use nfe_core::access_key::MAX_DOCUMENT_NUMBER;
use nfe_core::{AccessKey, DocumentModel, IssuerId, Region};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::sanitize::validated_text;

/// Usage conditions appended to every correction letter unless the caller
/// supplies a replacement.
pub const CONDITIONS_OF_USE: &str = "A Carta de Correcao e disciplinada pelo paragrafo 1o-A do art. 7o do Convenio S/N, de 15 de dezembro de 1970 e pode ser utilizada para regularizacao de erro ocorrido na emissao de documento fiscal, desde que o erro nao esteja relacionado com: I - as variaveis que determinam o valor do imposto tais como: base de calculo, aliquota, diferenca de preco, quantidade, valor da operacao ou da prestacao; II - a correcao de dados cadastrais que implique mudanca do remetente ou do destinatario; III - a data de emissao ou de saida.";

/// Highest correction letter sequence the authority accepts.
pub const MAX_CORRECTION_SEQUENCE: u32 = 20;

const CORRECTION_MIN: usize = 15;
const CORRECTION_MAX: usize = 1000;
const JUSTIFICATION_MIN: usize = 15;
const JUSTIFICATION_MAX: usize = 255;
const PROTOCOL_LEN: usize = 15;

// ─── Event types ─────────────────────────────────────────────────────

/// Wire event types and their routing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Carta de correção eletrônica.
    CorrectionLetter,
    /// Cancelamento.
    Cancellation,
    /// Cancelamento por substituição (consumer invoices).
    CancellationBySubstitution,
}

impl EventType {
    /// Numeric `tpEvento`.
    pub fn code(self) -> u32 {
        match self {
            Self::CorrectionLetter => 110110,
            Self::Cancellation => 110111,
            Self::CancellationBySubstitution => 110112,
        }
    }

    /// `verEvento` / `detEvento@versao` for this event type.
    pub fn version(self) -> &'static str {
        "1.00"
    }

    /// `descEvento` text; fixed by the authority's schema.
    pub fn description(self) -> &'static str {
        match self {
            Self::CorrectionLetter => "Carta de Correcao",
            Self::Cancellation => "Cancelamento",
            Self::CancellationBySubstitution => "Cancelamento por substituicao",
        }
    }

    /// Decode a numeric `tpEvento`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            110110 => Some(Self::CorrectionLetter),
            110111 => Some(Self::Cancellation),
            110112 => Some(Self::CancellationBySubstitution),
            _ => None,
        }
    }
}

// ─── Correction letter ───────────────────────────────────────────────

/// A validated correction letter request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionLetter {
    key: AccessKey,
    sequence: u32,
    text: String,
    conditions_of_use: String,
}

impl CorrectionLetter {
    /// Validate a correction letter.
    ///
    /// # Errors
    ///
    /// - [`EventError::SequenceViolation`] if `sequence` is outside `1..=20`.
    /// - Text length/content errors for `text` (15..=1000 characters).
    pub fn new(key: AccessKey, sequence: u32, text: &str) -> Result<Self, EventError> {
        if !(1..=MAX_CORRECTION_SEQUENCE).contains(&sequence) {
            return Err(EventError::SequenceViolation {
                got: sequence,
                reason: format!("must be between 1 and {MAX_CORRECTION_SEQUENCE}"),
            });
        }
        let text = validated_text("xCorrecao", text, CORRECTION_MIN, CORRECTION_MAX)?;
        Ok(Self {
            key,
            sequence,
            text,
            conditions_of_use: CONDITIONS_OF_USE.to_string(),
        })
    }

    /// Replace the default usage conditions.
    pub fn with_conditions_of_use(mut self, conditions: &str) -> Result<Self, EventError> {
        self.conditions_of_use =
            validated_text("xCondUso", conditions, CORRECTION_MIN, CORRECTION_MAX)?;
        Ok(self)
    }

    /// Target document.
    pub fn key(&self) -> &AccessKey {
        &self.key
    }

    /// Sequence number, 1..=20.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Sanitized correction text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Usage conditions boilerplate.
    pub fn conditions_of_use(&self) -> &str {
        &self.conditions_of_use
    }
}

// ─── Cancellation ────────────────────────────────────────────────────

/// Reference to the document that replaces a cancelled consumer invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    /// Key of the replacing document.
    pub replacing_key: AccessKey,
    /// Version string of the issuing application (`verAplic`).
    pub app_version: String,
}

/// A validated cancellation request. Always sequence 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cancellation {
    key: AccessKey,
    protocol: String,
    justification: String,
    substitution: Option<Substitution>,
}

impl Cancellation {
    /// Validate a cancellation of the document `key`, authorized under
    /// `protocol`.
    ///
    /// # Errors
    ///
    /// - [`EventError::InvalidField`] if `protocol` is not 15 digits.
    /// - Text length/content errors for the justification (15..=255).
    pub fn new(key: AccessKey, protocol: &str, justification: &str) -> Result<Self, EventError> {
        let protocol = validate_protocol(protocol)?;
        let justification =
            validated_text("xJust", justification, JUSTIFICATION_MIN, JUSTIFICATION_MAX)?;
        Ok(Self {
            key,
            protocol,
            justification,
            substitution: None,
        })
    }

    /// Validate a cancellation by substitution: the consumer invoice `key` is
    /// replaced by `replacing_key`.
    ///
    /// # Errors
    ///
    /// Everything [`Cancellation::new`] rejects, plus [`EventError::InvalidField`]
    /// when the target is not a consumer invoice, the replacing key equals the
    /// target, or the application version is empty.
    pub fn by_substitution(
        key: AccessKey,
        protocol: &str,
        justification: &str,
        replacing_key: AccessKey,
        app_version: &str,
    ) -> Result<Self, EventError> {
        if key.model() != DocumentModel::Nfce {
            return Err(EventError::InvalidField {
                field: "chNFe",
                reason: "cancellation by substitution applies to consumer invoices only".into(),
            });
        }
        if replacing_key == key {
            return Err(EventError::InvalidField {
                field: "chNFeRef",
                reason: "replacing document must differ from the cancelled one".into(),
            });
        }
        let app_version = app_version.trim();
        if app_version.is_empty() || app_version.chars().count() > 20 {
            return Err(EventError::InvalidField {
                field: "verAplic",
                reason: "application version must be 1 to 20 characters".into(),
            });
        }
        let mut cancellation = Self::new(key, protocol, justification)?;
        cancellation.substitution = Some(Substitution {
            replacing_key,
            app_version: app_version.to_string(),
        });
        Ok(cancellation)
    }

    /// Target document.
    pub fn key(&self) -> &AccessKey {
        &self.key
    }

    /// Authorization protocol of the target.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Sanitized justification.
    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Substitution details, when cancelling by substitution.
    pub fn substitution(&self) -> Option<&Substitution> {
        self.substitution.as_ref()
    }

    /// Always 1: cancellation is single-shot.
    pub fn sequence(&self) -> u32 {
        1
    }

    /// Wire event type.
    pub fn event_type(&self) -> EventType {
        if self.substitution.is_some() {
            EventType::CancellationBySubstitution
        } else {
            EventType::Cancellation
        }
    }
}

fn validate_protocol(protocol: &str) -> Result<String, EventError> {
    let protocol = protocol.trim();
    if protocol.len() != PROTOCOL_LEN || !protocol.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EventError::InvalidField {
            field: "nProt",
            reason: format!("protocol must be {PROTOCOL_LEN} digits, got {protocol:?}"),
        });
    }
    Ok(protocol.to_string())
}

// ─── Number invalidation ─────────────────────────────────────────────

/// Highest invalidation series.
pub const MAX_INVALIDATION_SERIES: u16 = 999;

/// A validated request to void a range of unused numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberInvalidation {
    region: Region,
    year: u8,
    issuer: IssuerId,
    model: DocumentModel,
    series: u16,
    start: u32,
    end: u32,
    justification: String,
}

impl NumberInvalidation {
    /// Validate an invalidation request. `year` may be given with two or four
    /// digits; only the last two are transmitted.
    ///
    /// # Errors
    ///
    /// - [`EventError::InvalidRange`] unless `1 <= series <= 999` and
    ///   `1 <= start <= end <= 999_999_999`.
    /// - Text length/content errors for the justification (15..=255).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        region: Region,
        year: u16,
        issuer: IssuerId,
        model: DocumentModel,
        series: u16,
        start: u32,
        end: u32,
        justification: &str,
    ) -> Result<Self, EventError> {
        if !(1..=MAX_INVALIDATION_SERIES).contains(&series) {
            return Err(EventError::InvalidRange {
                reason: format!("series {series} outside 1..={MAX_INVALIDATION_SERIES}"),
            });
        }
        if start < 1 || end > MAX_DOCUMENT_NUMBER || start > end {
            return Err(EventError::InvalidRange {
                reason: format!(
                    "range {start}..={end} must satisfy 1 <= start <= end <= {MAX_DOCUMENT_NUMBER}"
                ),
            });
        }
        let justification =
            validated_text("xJust", justification, JUSTIFICATION_MIN, JUSTIFICATION_MAX)?;
        Ok(Self {
            region,
            year: (year % 100) as u8,
            issuer,
            model,
            series,
            start,
            end,
            justification,
        })
    }

    /// Deterministic request identifier:
    /// `ID + cUF(2) + YY(2) + issuer(14) + model(2) + series(3) + start(9) + end(9)`.
    ///
    /// Identical inputs always produce the same id, which is how the
    /// authority recognises a resubmission.
    pub fn request_id(&self) -> String {
        format!(
            "ID{}{:02}{}{:02}{:03}{:09}{:09}",
            self.region.code_str(),
            self.year,
            self.issuer.padded(),
            self.model.code(),
            self.series,
            self.start,
            self.end,
        )
    }

    /// Region of the issuer.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Two-digit year.
    pub fn year(&self) -> u8 {
        self.year
    }

    /// Issuer tax id.
    pub fn issuer(&self) -> &IssuerId {
        &self.issuer
    }

    /// Document model.
    pub fn model(&self) -> DocumentModel {
        self.model
    }

    /// Series.
    pub fn series(&self) -> u16 {
        self.series
    }

    /// First voided number.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Last voided number.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Sanitized justification.
    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Whether `key` names a document inside this range.
    pub fn covers(&self, key: &AccessKey) -> bool {
        key.region() == self.region
            && key.model() == self.model
            && key.issuer() == self.issuer.padded()
            && key.series() == self.series
            && (self.start..=self.end).contains(&key.number())
    }
}

// ─── FiscalEvent ─────────────────────────────────────────────────────

/// Any of the three post-authorization requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FiscalEvent {
    /// Correction letter.
    CorrectionLetter(CorrectionLetter),
    /// Cancellation, plain or by substitution.
    Cancellation(Cancellation),
    /// Range invalidation.
    NumberInvalidation(NumberInvalidation),
}

impl FiscalEvent {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CorrectionLetter(_) => "correction letter",
            Self::Cancellation(c) if c.substitution().is_some() => "cancellation by substitution",
            Self::Cancellation(_) => "cancellation",
            Self::NumberInvalidation(_) => "number invalidation",
        }
    }

    /// Wire event type; invalidation is a separate service with no event code.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Self::CorrectionLetter(_) => Some(EventType::CorrectionLetter),
            Self::Cancellation(c) => Some(c.event_type()),
            Self::NumberInvalidation(_) => None,
        }
    }

    /// Target document key, if the event names one.
    pub fn key(&self) -> Option<&AccessKey> {
        match self {
            Self::CorrectionLetter(c) => Some(c.key()),
            Self::Cancellation(c) => Some(c.key()),
            Self::NumberInvalidation(_) => None,
        }
    }

    /// Sequence number (1 for everything but correction letters).
    pub fn sequence(&self) -> u32 {
        match self {
            Self::CorrectionLetter(c) => c.sequence(),
            Self::Cancellation(c) => c.sequence(),
            Self::NumberInvalidation(_) => 1,
        }
    }
}

impl From<CorrectionLetter> for FiscalEvent {
    fn from(value: CorrectionLetter) -> Self {
        Self::CorrectionLetter(value)
    }
}

impl From<Cancellation> for FiscalEvent {
    fn from(value: Cancellation) -> Self {
        Self::Cancellation(value)
    }
}

impl From<NumberInvalidation> for FiscalEvent {
    fn from(value: NumberInvalidation) -> Self {
        Self::NumberInvalidation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NFE_KEY: &str = "35241058716523000119550010000001231123456781";
    const NFCE_KEY: &str = "43241158716523000119650020000045671876543214";
    const PROTOCOL: &str = "135240000012345";

    fn nfe_key() -> AccessKey {
        AccessKey::parse(NFE_KEY).unwrap()
    }

    fn nfce_key() -> AccessKey {
        AccessKey::parse(NFCE_KEY).unwrap()
    }

    fn issuer() -> IssuerId {
        IssuerId::new("58716523000119").unwrap()
    }

    fn sp_invalidation(
        series: u16,
        start: u32,
        end: u32,
        justification: &str,
    ) -> Result<NumberInvalidation, EventError> {
        NumberInvalidation::new(
            Region::SaoPaulo,
            2024,
            issuer(),
            DocumentModel::Nfe,
            series,
            start,
            end,
            justification,
        )
    }

    #[test]
    fn correction_sequence_bounds() {
        assert!(CorrectionLetter::new(nfe_key(), 1, "Endereco de entrega corrigido").is_ok());
        assert!(CorrectionLetter::new(nfe_key(), 20, "Endereco de entrega corrigido").is_ok());
        for bad in [0, 21, 99] {
            assert!(matches!(
                CorrectionLetter::new(nfe_key(), bad, "Endereco de entrega corrigido"),
                Err(EventError::SequenceViolation { .. })
            ));
        }
    }

    #[test]
    fn correction_defaults_conditions_of_use() {
        let letter = CorrectionLetter::new(nfe_key(), 1, "Endereco de entrega corrigido").unwrap();
        assert_eq!(letter.conditions_of_use(), CONDITIONS_OF_USE);
        let custom = letter
            .with_conditions_of_use("Condicoes de uso especificas do emitente")
            .unwrap();
        assert_eq!(custom.conditions_of_use(), "Condicoes de uso especificas do emitente");
    }

    #[test]
    fn correction_text_bounds() {
        assert!(matches!(
            CorrectionLetter::new(nfe_key(), 1, "curto"),
            Err(EventError::JustificationTooShort { field: "xCorrecao", .. })
        ));
        assert!(matches!(
            CorrectionLetter::new(nfe_key(), 1, &"x".repeat(1001)),
            Err(EventError::JustificationTooLong { field: "xCorrecao", .. })
        ));
    }

    #[test]
    fn cancellation_validates_justification_and_protocol() {
        let ok = Cancellation::new(nfe_key(), PROTOCOL, "Pedido cancelado pelo cliente").unwrap();
        assert_eq!(ok.sequence(), 1);
        assert_eq!(ok.event_type(), EventType::Cancellation);

        assert!(matches!(
            Cancellation::new(nfe_key(), PROTOCOL, "ok"),
            Err(EventError::JustificationTooShort { .. })
        ));
        assert!(matches!(
            Cancellation::new(nfe_key(), "12345", "Pedido cancelado pelo cliente"),
            Err(EventError::InvalidField { field: "nProt", .. })
        ));
    }

    #[test]
    fn substitution_requires_consumer_invoice_and_distinct_key() {
        let replacing = AccessKey::builder()
            .region(nfce_key().region())
            .issuer("58716523000119")
            .model(DocumentModel::Nfce)
            .series(2)
            .number(4568)
            .issue_period("2411")
            .random_code("11112222")
            .build()
            .unwrap();

        let c = Cancellation::by_substitution(
            nfce_key(),
            PROTOCOL,
            "Emitida em duplicidade no caixa",
            replacing.clone(),
            "PDV-1.4.2",
        )
        .unwrap();
        assert_eq!(c.event_type(), EventType::CancellationBySubstitution);
        assert_eq!(c.substitution().unwrap().replacing_key, replacing);

        assert!(Cancellation::by_substitution(
            nfe_key(),
            PROTOCOL,
            "Emitida em duplicidade no caixa",
            replacing.clone(),
            "PDV-1.4.2",
        )
        .is_err());
        assert!(Cancellation::by_substitution(
            nfce_key(),
            PROTOCOL,
            "Emitida em duplicidade no caixa",
            nfce_key(),
            "PDV-1.4.2",
        )
        .is_err());
        assert!(Cancellation::by_substitution(
            nfce_key(),
            PROTOCOL,
            "Emitida em duplicidade no caixa",
            replacing,
            "  ",
        )
        .is_err());
    }

    #[test]
    fn invalidation_range_rules() {
        let just = "Falha no sistema pulou numeracao";
        let inverted = sp_invalidation(1, 100, 50, just);
        assert!(matches!(inverted, Err(EventError::InvalidRange { .. })));

        assert!(matches!(
            sp_invalidation(0, 1, 2, just),
            Err(EventError::InvalidRange { .. })
        ));
        assert!(matches!(
            sp_invalidation(1000, 1, 2, just),
            Err(EventError::InvalidRange { .. })
        ));
        assert!(matches!(
            sp_invalidation(1, 0, 2, just),
            Err(EventError::InvalidRange { .. })
        ));
        assert!(matches!(
            sp_invalidation(1, 1, 1_000_000_000, just),
            Err(EventError::InvalidRange { .. })
        ));
        assert!(matches!(
            sp_invalidation(1, 50, 100, "ok"),
            Err(EventError::JustificationTooShort { .. })
        ));
    }

    #[test]
    fn invalidation_request_id_is_deterministic() {
        let just = "Falha no sistema pulou numeracao";
        let a = sp_invalidation(1, 50, 100, just).unwrap();
        let b = NumberInvalidation::new(
            Region::SaoPaulo,
            24,
            issuer(),
            DocumentModel::Nfe,
            1,
            50,
            100,
            just,
        )
        .unwrap();
        assert_eq!(a.request_id(), "ID35245871652300011955001000000050000000100");
        assert_eq!(a.request_id(), b.request_id());
        assert_eq!(a.request_id().len(), 43);
    }

    #[test]
    fn invalidation_coverage() {
        let just = "Falha no sistema pulou numeracao";
        let covering = sp_invalidation(1, 100, 200, just).unwrap();
        assert!(covering.covers(&nfe_key()));
        let other_series = sp_invalidation(2, 100, 200, just).unwrap();
        assert!(!other_series.covers(&nfe_key()));
    }

    #[test]
    fn event_type_constants() {
        assert_eq!(EventType::CorrectionLetter.code(), 110110);
        assert_eq!(EventType::Cancellation.code(), 110111);
        assert_eq!(EventType::CancellationBySubstitution.code(), 110112);
        assert_eq!(EventType::from_code(110111), Some(EventType::Cancellation));
        assert_eq!(EventType::from_code(210200), None);
        assert_eq!(EventType::Cancellation.version(), "1.00");
    }
}
