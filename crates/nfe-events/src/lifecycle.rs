//! # Document Lifecycle State Machine
//!
//! Tracks one authorized document through the events issued against it.
//!
//! ## States
//!
//! ```text
//!                ┌──── correction (seq = last + 1, ≤ 20) ────┐
//!                ▼                                            │
//!           Authorized { corrections } ───────────────────────┘
//!             │                      │
//!   cancel (≤ 24h after authorization) invalidation covering the number
//!             ▼                      ▼
//!         Cancelled             Invalidated
//!         (terminal)             (terminal)
//! ```
//!
//! ## Design Decision
//!
//! The correction counter makes `Authorized` re-entrant with data, so the
//! state is an enum with validated transitions rather than a typestate.
//! Each `check_*` method is a pure pre-flight: it inspects history and the
//! clock, never mutates. [`DocumentLifecycle::record`] applies a transition
//! only after the authority has registered the event, and appends it to the
//! audit log.

use chrono::Duration;
use nfe_core::{AccessKey, EventTimestamp};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::event::{
    Cancellation, CorrectionLetter, FiscalEvent, NumberInvalidation, MAX_CORRECTION_SEQUENCE,
};

/// Hours after authorization during which cancellation is allowed.
pub const CANCELLATION_WINDOW_HOURS: i64 = 24;

/// Lifecycle state of an authorized document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentState {
    /// Authorized, with the number of correction letters registered so far.
    Authorized {
        /// Highest registered correction sequence (0 when none).
        corrections: u32,
    },
    /// Cancelled (terminal).
    Cancelled,
    /// Number voided by an invalidation (terminal).
    Invalidated,
}

impl DocumentState {
    /// Canonical state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authorized { corrections: 0 } => "AUTHORIZED",
            Self::Authorized { .. } => "AUTHORIZED_WITH_CORRECTIONS",
            Self::Cancelled => "CANCELLED",
            Self::Invalidated => "INVALIDATED",
        }
    }

    /// Whether no further events are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Invalidated)
    }
}

/// Record of a registered event and the transition it caused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the event.
    pub from_state: String,
    /// State after the event.
    pub to_state: String,
    /// Event name.
    pub event: String,
    /// Event sequence number.
    pub sequence: u32,
    /// When the authority registered the event.
    pub registered_at: EventTimestamp,
    /// Registration protocol returned by the authority, if any.
    pub protocol: Option<String>,
}

/// Post-authorization history of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLifecycle {
    key: AccessKey,
    protocol: String,
    authorized_at: EventTimestamp,
    state: DocumentState,
    transition_log: Vec<TransitionRecord>,
}

impl DocumentLifecycle {
    /// Start tracking a freshly authorized document.
    pub fn authorized(
        key: AccessKey,
        protocol: impl Into<String>,
        authorized_at: EventTimestamp,
    ) -> Self {
        Self {
            key,
            protocol: protocol.into(),
            authorized_at,
            state: DocumentState::Authorized { corrections: 0 },
            transition_log: Vec::new(),
        }
    }

    /// Resume tracking a document that already has registered corrections.
    ///
    /// # Errors
    ///
    /// [`EventError::SequenceViolation`] when `corrections` exceeds the
    /// highest sequence the authority accepts.
    pub fn with_corrections(mut self, corrections: u32) -> Result<Self, EventError> {
        if corrections > MAX_CORRECTION_SEQUENCE {
            return Err(EventError::SequenceViolation {
                got: corrections,
                reason: format!("at most {MAX_CORRECTION_SEQUENCE} corrections can be registered"),
            });
        }
        if let DocumentState::Authorized { .. } = self.state {
            self.state = DocumentState::Authorized { corrections };
        }
        Ok(self)
    }

    /// The tracked document.
    pub fn key(&self) -> &AccessKey {
        &self.key
    }

    /// Authorization protocol.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Authorization instant.
    pub fn authorized_at(&self) -> EventTimestamp {
        self.authorized_at
    }

    /// Current state.
    pub fn state(&self) -> DocumentState {
        self.state
    }

    /// Last instant at which a cancellation is accepted.
    pub fn cancellation_deadline(&self) -> EventTimestamp {
        self.authorized_at.plus(Duration::hours(CANCELLATION_WINDOW_HOURS))
    }

    /// Sequence the next correction letter must carry, if one is allowed.
    pub fn next_correction_sequence(&self) -> Option<u32> {
        match self.state {
            DocumentState::Authorized { corrections } if corrections < MAX_CORRECTION_SEQUENCE => {
                Some(corrections + 1)
            }
            _ => None,
        }
    }

    /// Registered transitions, oldest first.
    pub fn transition_log(&self) -> &[TransitionRecord] {
        &self.transition_log
    }

    /// Pre-flight check for any event variant.
    pub fn check(&self, event: &FiscalEvent, now: EventTimestamp) -> Result<(), EventError> {
        match event {
            FiscalEvent::CorrectionLetter(letter) => self.check_correction(letter),
            FiscalEvent::Cancellation(cancellation) => self.check_cancellation(cancellation, now),
            FiscalEvent::NumberInvalidation(invalidation) => self.check_invalidation(invalidation),
        }
    }

    /// A correction must target this document, which must still be
    /// authorized, and carry exactly `last + 1` as its sequence.
    pub fn check_correction(&self, letter: &CorrectionLetter) -> Result<(), EventError> {
        self.check_key(letter.key())?;
        let corrections = match self.state {
            DocumentState::Authorized { corrections } => corrections,
            other => {
                return Err(EventError::InvalidState {
                    state: other.name(),
                    event: "correction letter",
                })
            }
        };
        let expected = corrections + 1;
        if letter.sequence() != expected {
            let reason = if letter.sequence() <= corrections {
                format!("sequence already used, next is {expected}")
            } else {
                format!("sequence skips ahead, next is {expected}")
            };
            return Err(EventError::SequenceViolation {
                got: letter.sequence(),
                reason,
            });
        }
        Ok(())
    }

    /// A cancellation must target this document, which must be authorized
    /// and still inside the 24-hour window.
    pub fn check_cancellation(
        &self,
        cancellation: &Cancellation,
        now: EventTimestamp,
    ) -> Result<(), EventError> {
        self.check_key(cancellation.key())?;
        self.check_cancellable()?;
        let deadline = self.cancellation_deadline();
        if now > deadline {
            return Err(EventError::DeadlineExceeded { deadline, now });
        }
        Ok(())
    }

    /// An invalidation recorded against this document must cover its number.
    pub fn check_invalidation(&self, invalidation: &NumberInvalidation) -> Result<(), EventError> {
        if self.state.is_terminal() {
            return Err(EventError::InvalidState {
                state: self.state.name(),
                event: "number invalidation",
            });
        }
        if !invalidation.covers(&self.key) {
            return Err(EventError::InvalidRange {
                reason: format!(
                    "series {} numbers {}..={} do not cover document {}",
                    invalidation.series(),
                    invalidation.start(),
                    invalidation.end(),
                    self.key
                ),
            });
        }
        Ok(())
    }

    /// Apply an event the authority has registered.
    ///
    /// Re-runs the structural checks (key, state, sequence) but not the
    /// cancellation deadline: the authority is the judge of late
    /// cancellations it chose to accept.
    pub fn record(
        &mut self,
        event: &FiscalEvent,
        registered_at: EventTimestamp,
        protocol: Option<String>,
    ) -> Result<(), EventError> {
        let next = match event {
            FiscalEvent::CorrectionLetter(letter) => {
                self.check_correction(letter)?;
                DocumentState::Authorized {
                    corrections: letter.sequence(),
                }
            }
            FiscalEvent::Cancellation(cancellation) => {
                self.check_key(cancellation.key())?;
                self.check_cancellable()?;
                DocumentState::Cancelled
            }
            FiscalEvent::NumberInvalidation(invalidation) => {
                self.check_invalidation(invalidation)?;
                DocumentState::Invalidated
            }
        };

        tracing::info!(
            key = %self.key,
            event = event.name(),
            sequence = event.sequence(),
            from = self.state.name(),
            to = next.name(),
            "document lifecycle transition"
        );
        self.transition_log.push(TransitionRecord {
            from_state: self.state.name().to_string(),
            to_state: next.name().to_string(),
            event: event.name().to_string(),
            sequence: event.sequence(),
            registered_at,
            protocol,
        });
        self.state = next;
        Ok(())
    }

    fn check_key(&self, key: &AccessKey) -> Result<(), EventError> {
        if key != &self.key {
            return Err(EventError::KeyMismatch {
                expected: self.key.to_string(),
                got: key.to_string(),
            });
        }
        Ok(())
    }

    fn check_cancellable(&self) -> Result<(), EventError> {
        match self.state {
            DocumentState::Authorized { .. } => Ok(()),
            DocumentState::Cancelled => Err(EventError::DuplicateEvent {
                event: "cancellation",
                sequence: 1,
            }),
            DocumentState::Invalidated => Err(EventError::InvalidState {
                state: self.state.name(),
                event: "cancellation",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfe_core::{DocumentModel, IssuerId, Region};

    const KEY: &str = "35241058716523000119550010000001231123456781";
    const OTHER_KEY: &str = "43241158716523000119650020000045671876543214";
    const PROTOCOL: &str = "135240000012345";
    const TEXT: &str = "Endereco de entrega corrigido para Rua B";

    fn key() -> AccessKey {
        AccessKey::parse(KEY).unwrap()
    }

    fn authorized_at() -> EventTimestamp {
        EventTimestamp::parse("2024-10-03T10:00:00-03:00").unwrap()
    }

    fn lifecycle() -> DocumentLifecycle {
        DocumentLifecycle::authorized(key(), PROTOCOL, authorized_at())
    }

    fn correction(seq: u32) -> FiscalEvent {
        CorrectionLetter::new(key(), seq, TEXT).unwrap().into()
    }

    fn cancellation() -> Cancellation {
        Cancellation::new(key(), PROTOCOL, "Pedido cancelado pelo cliente").unwrap()
    }

    fn later(minutes: i64, seconds: i64) -> EventTimestamp {
        authorized_at().plus(Duration::minutes(minutes) + Duration::seconds(seconds))
    }

    #[test]
    fn consecutive_corrections_succeed() {
        let mut doc = lifecycle();
        for seq in 1..=3 {
            let event = correction(seq);
            doc.check(&event, later(seq as i64, 0)).unwrap();
            doc.record(&event, later(seq as i64, 0), None).unwrap();
        }
        assert_eq!(doc.state(), DocumentState::Authorized { corrections: 3 });
        assert_eq!(doc.state().name(), "AUTHORIZED_WITH_CORRECTIONS");
        assert_eq!(doc.next_correction_sequence(), Some(4));
        assert_eq!(doc.transition_log().len(), 3);
        assert_eq!(doc.transition_log()[0].from_state, "AUTHORIZED");
    }

    #[test]
    fn skipped_sequence_is_rejected() {
        let mut doc = lifecycle();
        doc.record(&correction(1), later(1, 0), None).unwrap();
        let err = doc.check(&correction(3), later(2, 0)).unwrap_err();
        assert!(matches!(err, EventError::SequenceViolation { got: 3, .. }));
    }

    #[test]
    fn repeated_sequence_is_rejected() {
        let mut doc = lifecycle();
        doc.record(&correction(1), later(1, 0), None).unwrap();
        let err = doc.check(&correction(1), later(2, 0)).unwrap_err();
        assert!(matches!(err, EventError::SequenceViolation { got: 1, .. }));
    }

    #[test]
    fn twenty_corrections_then_nothing_more() {
        let doc = lifecycle().with_corrections(20).unwrap();
        assert_eq!(doc.next_correction_sequence(), None);
        assert!(CorrectionLetter::new(key(), 21, TEXT).is_err());
    }

    #[test]
    fn resumed_history_beyond_the_limit_is_rejected() {
        assert!(matches!(
            lifecycle().with_corrections(21),
            Err(EventError::SequenceViolation { got: 21, .. })
        ));
        let doc = lifecycle().with_corrections(7).unwrap();
        assert_eq!(doc.next_correction_sequence(), Some(8));
    }

    #[test]
    fn cancellation_inside_window_passes() {
        let doc = lifecycle();
        doc.check_cancellation(&cancellation(), later(23 * 60 + 59, 0)).unwrap();
        doc.check_cancellation(&cancellation(), later(24 * 60, 0)).unwrap();
    }

    #[test]
    fn cancellation_after_window_fails() {
        let doc = lifecycle();
        let err = doc
            .check_cancellation(&cancellation(), later(24 * 60, 1))
            .unwrap_err();
        assert!(matches!(err, EventError::DeadlineExceeded { .. }));
    }

    #[test]
    fn deadline_is_offset_independent() {
        let doc = lifecycle();
        // 13:00:01 UTC next day is 24h00m01s after 10:00-03:00.
        let now = EventTimestamp::parse("2024-10-04T13:00:01Z").unwrap();
        assert!(doc.check_cancellation(&cancellation(), now).is_err());
    }

    #[test]
    fn cancellation_is_terminal() {
        let mut doc = lifecycle();
        let cancel: FiscalEvent = cancellation().into();
        doc.record(&cancel, later(60, 0), Some("135240000099999".into())).unwrap();
        assert_eq!(doc.state(), DocumentState::Cancelled);
        assert!(doc.state().is_terminal());

        let err = doc.check(&cancel, later(61, 0)).unwrap_err();
        assert_eq!(
            err,
            EventError::DuplicateEvent {
                event: "cancellation",
                sequence: 1
            }
        );
        let err = doc.check(&correction(1), later(61, 0)).unwrap_err();
        assert!(matches!(err, EventError::InvalidState { state: "CANCELLED", .. }));
    }

    #[test]
    fn cancellation_after_corrections_is_allowed() {
        let mut doc = lifecycle();
        doc.record(&correction(1), later(1, 0), None).unwrap();
        doc.check_cancellation(&cancellation(), later(2, 0)).unwrap();
    }

    #[test]
    fn event_for_another_document_is_rejected() {
        let doc = lifecycle();
        let other = AccessKey::parse(OTHER_KEY).unwrap();
        let letter = CorrectionLetter::new(other, 1, TEXT).unwrap();
        assert!(matches!(
            doc.check_correction(&letter),
            Err(EventError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn invalidation_must_cover_document() {
        let mut doc = lifecycle();
        let issuer = IssuerId::new("58716523000119").unwrap();
        let just = "Numero pulado por falha do sistema";
        let range = |start, end| {
            NumberInvalidation::new(
                Region::SaoPaulo,
                2024,
                issuer.clone(),
                DocumentModel::Nfe,
                1,
                start,
                end,
                just,
            )
            .unwrap()
        };
        let miss = range(200, 300);
        assert!(matches!(
            doc.check_invalidation(&miss),
            Err(EventError::InvalidRange { .. })
        ));

        let hit: FiscalEvent = range(100, 200).into();
        doc.record(&hit, later(5, 0), None).unwrap();
        assert_eq!(doc.state(), DocumentState::Invalidated);
        assert!(matches!(
            doc.check_cancellation(&cancellation(), later(6, 0)),
            Err(EventError::InvalidState { state: "INVALIDATED", .. })
        ));
    }

    #[test]
    fn lifecycle_serializes_with_log() {
        let mut doc = lifecycle();
        doc.record(&correction(1), later(1, 0), Some("135240000011111".into())).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let back: DocumentLifecycle = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state(), doc.state());
        assert_eq!(back.transition_log(), doc.transition_log());
    }
}
