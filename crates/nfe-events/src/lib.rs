//! # nfe-events — Post-Authorization Fiscal Events
//!
//! Once a document is authorized, three follow-up actions are possible:
//!
//! - a **correction letter** amending non-financial, non-identity fields,
//!   re-issuable up to 20 times with strictly consecutive sequence numbers;
//! - a **cancellation**, single-shot and only within 24 hours of
//!   authorization;
//! - a **number invalidation**, which voids a contiguous range of unused
//!   numbers in one series.
//!
//! This crate validates those requests locally ([`event`], [`lifecycle`]) and
//! renders the messages the authority expects ([`message`]). Nothing here
//! performs I/O: every check runs before a network call is considered.
//!
//! ## Modules
//!
//! - [`sanitize`]: whitespace collapsing, XML-illegal character stripping,
//!   and the authority's printable-range content rule.
//! - [`event`]: validated constructors for each event variant.
//! - [`lifecycle`]: the per-document state machine and audit log.
//! - [`message`]: event and invalidation envelopes.

pub mod error;
pub mod event;
pub mod lifecycle;
pub mod message;
pub mod sanitize;
mod xml;

pub use error::EventError;
pub use event::{
    Cancellation, CorrectionLetter, EventType, FiscalEvent, NumberInvalidation, Substitution,
    CONDITIONS_OF_USE,
};
pub use lifecycle::{DocumentLifecycle, DocumentState, TransitionRecord};
pub use message::{
    wrap_event_batch, EventContext, EventDetail, EventMessage, EventMessageBuilder,
    InvalidationMessage, PreparedMessage,
};
