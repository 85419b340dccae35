//! # nfe-client — Fiscal Document Orchestrator
//!
//! Ties the workspace together for one issuer. [`DocumentClient`] validates
//! requests with `nfe-events`, signs them through a [`DocumentSigner`],
//! resolves and delivers them with `nfe-transport`, and applies registered
//! events to the caller's [`nfe_events::DocumentLifecycle`].
//!
//! ## Modules
//!
//! - [`config`]: [`ClientConfig`], from YAML or `NFE_*` variables.
//! - [`signer`]: the signing boundary and its output checks.
//! - [`request`]: status, query, submission, and receipt payloads.
//! - [`outcome`]: authorization verdicts and event receipts.
//! - [`client`]: the orchestrator.
//!
//! ## Crate Policy
//!
//! - Validation precedes I/O in every operation.
//! - The client holds no per-document state; lifecycles belong to the
//!   caller and are passed in by mutable reference.

pub mod client;
pub mod config;
pub mod error;
pub mod outcome;
pub mod request;
pub mod signer;

pub use client::DocumentClient;
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use outcome::{AuthorizationOutcome, EventReceipt, InvalidationReceipt};
pub use signer::{DocumentSigner, SignError};
