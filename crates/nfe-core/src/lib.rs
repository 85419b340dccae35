//! # nfe-core — Foundational Types for Electronic Fiscal Documents
//!
//! This crate is the leaf of the workspace DAG. It defines the identity
//! primitives every other crate builds on and depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **The access key is a validated value.** [`AccessKey`] can only be
//!    obtained through [`AccessKeyBuilder::build`] or [`AccessKey::parse`],
//!    both of which enforce the field widths and the mod-11 check digit.
//!    A string that fails either check never becomes an `AccessKey`.
//!
//! 2. **Closed sets instead of lookup strings.** Regions, document models,
//!    environments, emission types, and authority status codes are enums.
//!    Unmapped inputs are errors (or an explicit `Unknown` variant for
//!    status codes), never a silent default.
//!
//! 3. **Offset-aware timestamps.** The authority requires an explicit UTC
//!    offset on every timestamp; [`EventTimestamp`] always renders one.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `nfe-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod access_key;
pub mod error;
pub mod model;
pub mod region;
pub mod status;
pub mod tax_id;
pub mod temporal;

pub use access_key::{mod11_check_digit, AccessKey, AccessKeyBuilder, ACCESS_KEY_LEN};
pub use error::{KeyError, ValidationError};
pub use model::{DocumentModel, EmissionType, Environment};
pub use region::Region;
pub use status::AuthorityStatus;
pub use tax_id::IssuerId;
pub use temporal::{offset_from_minutes, EventTimestamp, DEFAULT_UTC_OFFSET_MINUTES};
