//! Event validation errors.
//!
//! Every variant is a local pre-flight failure: it is returned before any
//! message is built or sent, and it carries enough detail for the caller to
//! fix the input and resubmit.

use nfe_core::{EventTimestamp, KeyError};
use thiserror::Error;

/// Errors from event validation and lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Sequence number out of range, repeated, or not consecutive.
    #[error("sequence violation: got {got}, {reason}")]
    SequenceViolation {
        /// The sequence number supplied.
        got: u32,
        /// What the rule expected.
        reason: String,
    },

    /// The cancellation window has closed.
    #[error("cancellation deadline {deadline} exceeded at {now}")]
    DeadlineExceeded {
        /// Last instant at which cancellation was allowed.
        deadline: EventTimestamp,
        /// The instant the request was evaluated.
        now: EventTimestamp,
    },

    /// Text shorter than the minimum after sanitation.
    #[error("{field} too short: {actual} characters, minimum {min}")]
    JustificationTooShort {
        /// Which text field.
        field: &'static str,
        /// Minimum length.
        min: usize,
        /// Length after sanitation.
        actual: usize,
    },

    /// Text longer than the maximum after sanitation.
    #[error("{field} too long: more than {max} characters")]
    JustificationTooLong {
        /// Which text field.
        field: &'static str,
        /// Maximum length.
        max: usize,
    },

    /// Text contains characters outside the authority's printable range.
    #[error("{field} contains invalid text: {reason}")]
    InvalidText {
        /// Which text field.
        field: &'static str,
        /// The offending content.
        reason: String,
    },

    /// Invalidation range or series out of bounds, or a range that does not
    /// cover the document it is applied to.
    #[error("invalid range: {reason}")]
    InvalidRange {
        /// Description of the violation.
        reason: String,
    },

    /// The event was already registered for this document.
    #[error("duplicate {event} event (sequence {sequence})")]
    DuplicateEvent {
        /// Event name.
        event: &'static str,
        /// Sequence that was already used.
        sequence: u32,
    },

    /// The document's current state does not admit this event.
    #[error("{event} not allowed while document is {state}")]
    InvalidState {
        /// Current lifecycle state.
        state: &'static str,
        /// Attempted event.
        event: &'static str,
    },

    /// The event targets a different document than the lifecycle tracks.
    #[error("event targets key {got}, lifecycle tracks {expected}")]
    KeyMismatch {
        /// Key of the tracked document.
        expected: String,
        /// Key the event names.
        got: String,
    },

    /// A non-text field failed a format rule.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The XML writer failed.
    #[error("failed to render {element}: {reason}")]
    Render {
        /// Element being written.
        element: String,
        /// Underlying writer error.
        reason: String,
    },

    /// A referenced access key did not validate.
    #[error("access key error: {0}")]
    Key(#[from] KeyError),
}
