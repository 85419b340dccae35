//! # nfe-transport — Delivery to the Fiscal Authority
//!
//! Everything between a signed payload and a typed response:
//!
//! - [`endpoint`]: `(region, environment, model, service, channel)` to URL
//!   and SOAP action, through an ordered chain of sources.
//! - [`transport`]: the [`Transport`] seam and its HTTPS implementation with
//!   mutual TLS.
//! - [`retry`]: bounded, fixed-delay retry of transient failures under a
//!   cancellation token and a per-call deadline.
//! - [`soap`]: request envelopes and dual-shape result extraction.
//! - [`response`]: typed result elements for each service.
//! - [`contingency`]: the process-wide contingency flag.
//!
//! ## Crate Policy
//!
//! - No `unwrap()` outside tests.
//! - No shared mutable state except [`ContingencyManager`] and the
//!   diagnostic last-exchange slot.

pub mod contingency;
pub mod endpoint;
pub mod error;
pub mod response;
pub mod retry;
pub mod soap;
pub mod transport;

pub use contingency::{ContingencyManager, ContingencyMode, ContingencyState};
pub use endpoint::{
    Channel, EndpointEntry, EndpointQuery, EndpointSource, EndpointTable, ResolverChain,
    ServiceEndpoint, ServiceKind,
};
pub use error::{ContingencyError, ResolveError, TransportError};
pub use response::{
    AuthorityReply, AuthorizationResponse, AuthorizationResultResponse, DocumentProtocol,
    EventResponse, EventResult, InvalidationResponse, ProtocolInfo, QueryResponse, ReceiptInfo,
    StatusResponse,
};
pub use retry::{send_with_retry, RetryPolicy};
pub use transport::{
    ClientCertificate, HttpTransport, Transport, TransportConfig, TransportExchange,
};

pub use tokio_util::sync::CancellationToken;
