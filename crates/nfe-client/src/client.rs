//! # Document Client
//!
//! [`DocumentClient`] drives every exchange with the authority for one
//! issuer: service status, document authorization, receipt and situation
//! queries, correction letters, cancellations, and number invalidations.
//!
//! ## Flow
//!
//! Each operation runs the same pipeline:
//!
//! 1. Local validation: key, lifecycle rules, text, lot id, signature shape.
//! 2. Message rendering and signing.
//! 3. Endpoint resolution on the channel the contingency manager selects.
//! 4. Delivery through the [`Transport`] with its retry bounds.
//! 5. Decoding, and for events, recording the transition in the
//!    [`DocumentLifecycle`].
//!
//! Steps 1 and 2 never touch the network: a request that fails them is not
//! sent.

use std::fmt;
use std::sync::Arc;

use chrono::FixedOffset;
use nfe_core::{AccessKey, AccessKeyBuilder, AuthorityStatus, DocumentModel, EventTimestamp, Region};
use nfe_events::{
    wrap_event_batch, Cancellation, CorrectionLetter, DocumentLifecycle, EventContext,
    EventMessageBuilder, FiscalEvent, NumberInvalidation,
};
use nfe_transport::soap::extract_result;
use nfe_transport::{
    AuthorityReply, AuthorizationResponse, AuthorizationResultResponse, CancellationToken,
    ContingencyManager, EndpointQuery, EventResponse, InvalidationResponse, QueryResponse,
    ResolverChain, ServiceEndpoint, ServiceKind, StatusResponse, Transport, TransportExchange,
};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::outcome::{AuthorizationOutcome, EventReceipt, InvalidationReceipt};
use crate::request;
use crate::signer::{ensure_reference, ensure_signed, DocumentSigner};

type Clock = Arc<dyn Fn(FixedOffset) -> EventTimestamp + Send + Sync>;

/// Orchestrates requests to the fiscal authority for one issuer.
pub struct DocumentClient {
    config: ClientConfig,
    offset: FixedOffset,
    resolver: ResolverChain,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn DocumentSigner>,
    contingency: ContingencyManager,
    clock: Clock,
}

impl fmt::Debug for DocumentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentClient")
            .field("issuer", &self.config.issuer)
            .field("region", &self.config.region)
            .field("environment", &self.config.environment)
            .field("resolver", &self.resolver)
            .field("signer", &self.signer.provider_name())
            .field("contingency", &self.contingency.state())
            .finish()
    }
}

impl DocumentClient {
    /// Client for `config`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] when `config` does not validate.
    pub fn new(
        config: ClientConfig,
        resolver: ResolverChain,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn DocumentSigner>,
        contingency: ContingencyManager,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let offset = config.utc_offset()?;
        Ok(Self {
            config,
            offset,
            resolver,
            transport,
            signer,
            contingency,
            clock: Arc::new(EventTimestamp::now_in),
        })
    }

    /// Replace the wall clock used for event timestamps and deadlines.
    pub fn with_clock(
        mut self,
        clock: impl Fn(FixedOffset) -> EventTimestamp + Send + Sync + 'static,
    ) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The contingency handle consulted for every call.
    pub fn contingency(&self) -> &ContingencyManager {
        &self.contingency
    }

    /// Most recent request and response, for diagnostics.
    pub fn last_exchange(&self) -> Option<TransportExchange> {
        self.transport.last_exchange()
    }

    /// Key builder preset with this issuer, region, model, and the emission
    /// type of the active contingency mode.
    pub fn key_builder(&self) -> AccessKeyBuilder {
        AccessKey::builder()
            .region(self.config.region)
            .issuer(self.config.issuer.as_str())
            .model(self.config.model)
            .emission_type(self.contingency.emission_type())
    }

    // ─── Document services ───────────────────────────────────────────

    /// Ask whether the authorizer is accepting requests.
    ///
    /// A stopped service is reported through the response status, not as an
    /// error.
    pub async fn service_status(
        &self,
        cancel: &CancellationToken,
    ) -> Result<StatusResponse, ClientError> {
        let payload = request::status_request(self.config.environment, self.config.region);
        let endpoint = self.endpoint(self.config.region, self.config.model, ServiceKind::Status)?;
        let response: StatusResponse = self.exchange(&endpoint, &payload, cancel).await?;
        tracing::info!(
            region = %self.config.region,
            status = response.status_code,
            available = response.status().is_service_available(),
            "service status"
        );
        Ok(response)
    }

    /// Submit one signed document for authorization.
    ///
    /// `signed_document` is an `NFe` element signed over
    /// `Id="NFe{key}"`. Consumer documents must be sent synchronously.
    ///
    /// # Errors
    ///
    /// Local errors when the document key is malformed, belongs to another
    /// issuer, region or model, does not match the active contingency mode,
    /// or the signature is missing. Transport errors as delivered.
    pub async fn authorize(
        &self,
        signed_document: &str,
        lot_id: u64,
        synchronous: bool,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationOutcome, ClientError> {
        let key = document_key(signed_document)?;
        self.check_own_key(&key)?;
        if key.model() == DocumentModel::Nfce && !synchronous {
            return Err(ClientError::InvalidInput {
                field: "indSinc",
                reason: "consumer documents are authorized synchronously only".into(),
            });
        }
        if self.contingency.is_active() && key.emission_type() != self.contingency.emission_type()
        {
            return Err(ClientError::InvalidInput {
                field: "tpEmis",
                reason: format!(
                    "key carries {}, active contingency requires {}",
                    key.emission_type(),
                    self.contingency.emission_type()
                ),
            });
        }
        ensure_signed(signed_document, &format!("NFe{key}"))?;
        let payload = request::authorization_request(lot_id, synchronous, signed_document)?;

        let endpoint = self.endpoint(key.region(), key.model(), ServiceKind::Authorization)?;
        let response: AuthorizationResponse = self.exchange(&endpoint, &payload, cancel).await?;
        let outcome = AuthorizationOutcome::from_submission(response);
        tracing::info!(
            key = %key,
            lot_id,
            synchronous,
            outcome = outcome_name(&outcome),
            "document submitted"
        );
        Ok(outcome)
    }

    /// Fetch the verdict of an asynchronous submission.
    pub async fn authorization_result(
        &self,
        receipt: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationOutcome, ClientError> {
        let payload = request::receipt_request(self.config.environment, receipt)?;
        let endpoint = self.endpoint(
            self.config.region,
            self.config.model,
            ServiceKind::AuthorizationResult,
        )?;
        let response: AuthorizationResultResponse =
            self.exchange(&endpoint, &payload, cancel).await?;
        let outcome = AuthorizationOutcome::from_result(receipt, response);
        tracing::info!(receipt, outcome = outcome_name(&outcome), "receipt queried");
        Ok(outcome)
    }

    /// Current situation of the document identified by `key`.
    pub async fn query(
        &self,
        key: &AccessKey,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, ClientError> {
        let payload = request::query_request(self.config.environment, key);
        let endpoint = self.endpoint(key.region(), key.model(), ServiceKind::Query)?;
        let response: QueryResponse = self.exchange(&endpoint, &payload, cancel).await?;
        tracing::info!(
            key = %key,
            status = response.status_code,
            events = response.events.len(),
            "document queried"
        );
        Ok(response)
    }

    // ─── Events ──────────────────────────────────────────────────────

    /// Register a correction letter against the tracked document.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Event`] when the lifecycle refuses the letter (wrong
    ///   key, terminal state, non-consecutive sequence). Nothing is sent.
    /// - [`ClientError::AuthorityRejected`] when the authority does not
    ///   register it. The lifecycle is unchanged.
    pub async fn correct(
        &self,
        lifecycle: &mut DocumentLifecycle,
        letter: CorrectionLetter,
        lot_id: u64,
        cancel: &CancellationToken,
    ) -> Result<EventReceipt, ClientError> {
        self.submit_event(lifecycle, letter.into(), lot_id, cancel)
            .await
    }

    /// Register a cancellation (plain or by substitution).
    ///
    /// # Errors
    ///
    /// As [`DocumentClient::correct`], plus
    /// [`nfe_events::EventError::DeadlineExceeded`] once the cancellation
    /// window has closed.
    pub async fn cancel(
        &self,
        lifecycle: &mut DocumentLifecycle,
        cancellation: Cancellation,
        lot_id: u64,
        cancel: &CancellationToken,
    ) -> Result<EventReceipt, ClientError> {
        self.submit_event(lifecycle, cancellation.into(), lot_id, cancel)
            .await
    }

    /// Void a range of unused numbers.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Event`] when the request names another issuer.
    /// - [`ClientError::AuthorityRejected`] unless the authority answers 102.
    pub async fn invalidate(
        &self,
        invalidation: NumberInvalidation,
        cancel: &CancellationToken,
    ) -> Result<InvalidationReceipt, ClientError> {
        let region = invalidation.region();
        let model = invalidation.model();
        let event = FiscalEvent::from(invalidation);
        let message = self.builder(self.now()).build(&event)?;
        let signed = self.sign(&message.to_xml()?, message.reference_id())?;

        let endpoint = self.endpoint(region, model, ServiceKind::Invalidation)?;
        let response: InvalidationResponse = self.exchange(&endpoint, &signed, cancel).await?;
        let status = response.status();
        if status != AuthorityStatus::InvalidationHomologated {
            tracing::warn!(
                id = message.reference_id(),
                status = response.status_code(),
                "invalidation rejected"
            );
            return Err(ClientError::AuthorityRejected {
                status,
                message: response.info.message,
            });
        }
        tracing::info!(
            id = message.reference_id(),
            protocol = ?response.info.protocol,
            "number range invalidated"
        );
        Ok(InvalidationReceipt {
            status,
            message: response.info.message,
            protocol: response.info.protocol,
            received_at: response.info.received_at,
        })
    }

    async fn submit_event(
        &self,
        lifecycle: &mut DocumentLifecycle,
        event: FiscalEvent,
        lot_id: u64,
        cancel: &CancellationToken,
    ) -> Result<EventReceipt, ClientError> {
        let now = self.now();
        lifecycle.check(&event, now)?;
        request::check_lot_id(lot_id)?;

        let message = self.builder(now).build(&event)?;
        let signed = self.sign(&message.to_xml()?, message.reference_id())?;
        let batch = wrap_event_batch(lot_id, std::slice::from_ref(&signed))?;

        let key = lifecycle.key().clone();
        let sequence = event.sequence();
        let endpoint = self.endpoint(key.region(), key.model(), ServiceKind::EventReception)?;
        let response: EventResponse = self.exchange(&endpoint, &batch, cancel).await?;

        let Some(result) = response.result_for(sequence) else {
            let status = response.status();
            if status == AuthorityStatus::EventBatchProcessed {
                return Err(ClientError::IncompleteResponse {
                    reason: format!("no result for event sequence {sequence}"),
                });
            }
            return Err(ClientError::AuthorityRejected {
                status,
                message: response.message.clone(),
            });
        };

        let status = result.status();
        if !status.is_event_registered() {
            tracing::warn!(
                key = %key,
                event = event.name(),
                sequence,
                status = result.status_code,
                "event rejected"
            );
            return Err(ClientError::AuthorityRejected {
                status,
                message: result.message.clone(),
            });
        }

        let registered_at = result
            .registered_at
            .as_deref()
            .and_then(|at| EventTimestamp::parse(at).ok())
            .unwrap_or(now);
        lifecycle.record(&event, registered_at, result.protocol.clone())?;
        Ok(EventReceipt {
            key,
            sequence,
            status,
            message: result.message.clone(),
            protocol: result.protocol.clone(),
            registered_at,
        })
    }

    // ─── Plumbing ────────────────────────────────────────────────────

    fn now(&self) -> EventTimestamp {
        (self.clock)(self.offset)
    }

    fn builder(&self, now: EventTimestamp) -> EventMessageBuilder {
        EventMessageBuilder::new(EventContext::new(
            self.config.issuer.clone(),
            self.config.environment,
            now,
        ))
    }

    fn sign(&self, xml: &str, reference_id: &str) -> Result<String, ClientError> {
        ensure_reference(xml, reference_id)?;
        let signed = self.signer.sign(xml, reference_id)?;
        ensure_signed(&signed, reference_id)?;
        tracing::debug!(
            reference_id,
            provider = self.signer.provider_name(),
            "message signed"
        );
        Ok(signed)
    }

    fn endpoint(
        &self,
        region: Region,
        model: DocumentModel,
        service: ServiceKind,
    ) -> Result<ServiceEndpoint, ClientError> {
        let query = EndpointQuery::new(region, self.config.environment, model, service)
            .via(self.contingency.channel());
        Ok(self.resolver.resolve(&query)?)
    }

    async fn exchange<T: DeserializeOwned>(
        &self,
        endpoint: &ServiceEndpoint,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<T, ClientError> {
        let raw = self.transport.call(endpoint, payload, cancel).await?;
        Ok(extract_result(&raw)?)
    }

    fn check_own_key(&self, key: &AccessKey) -> Result<(), ClientError> {
        let mismatch =
            |field: &'static str, reason: String| ClientError::InvalidInput { field, reason };
        if key.issuer() != self.config.issuer.padded() {
            return Err(mismatch(
                "chNFe",
                format!("key issuer {} is not {}", key.issuer(), self.config.issuer),
            ));
        }
        if key.region() != self.config.region {
            return Err(mismatch(
                "chNFe",
                format!("key region {} is not {}", key.region(), self.config.region),
            ));
        }
        if key.model() != self.config.model {
            return Err(mismatch(
                "chNFe",
                format!("key model {} is not {}", key.model(), self.config.model),
            ));
        }
        Ok(())
    }
}

/// Access key named by `Id="NFe{key}"` in a document.
fn document_key(document: &str) -> Result<AccessKey, ClientError> {
    const MARKER: &str = "Id=\"NFe";
    let start = document
        .find(MARKER)
        .map(|i| i + MARKER.len())
        .ok_or_else(|| ClientError::InvalidInput {
            field: "infNFe",
            reason: "no Id=\"NFe...\" attribute".into(),
        })?;
    let digits = document[start..]
        .split('"')
        .next()
        .unwrap_or_default();
    Ok(AccessKey::parse(digits)?)
}

fn outcome_name(outcome: &AuthorizationOutcome) -> &'static str {
    match outcome {
        AuthorizationOutcome::Authorized(_) => "authorized",
        AuthorizationOutcome::Denied(_) => "denied",
        AuthorizationOutcome::Rejected { .. } => "rejected",
        AuthorizationOutcome::Pending { .. } => "pending",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_key_is_read_from_the_id() {
        let doc = concat!(
            r#"<NFe><infNFe versao="4.00" "#,
            r#"Id="NFe35241058716523000119550010000001231123456781"></infNFe></NFe>"#
        );
        assert_eq!(
            document_key(doc).unwrap().as_str(),
            "35241058716523000119550010000001231123456781"
        );
    }

    #[test]
    fn document_without_id_or_with_bad_key_is_rejected() {
        assert!(matches!(
            document_key("<NFe><infNFe/></NFe>"),
            Err(ClientError::InvalidInput { field: "infNFe", .. })
        ));
        let corrupted = r#"<infNFe Id="NFe35241058716523000119550010000001231123456782">"#;
        assert!(matches!(document_key(corrupted), Err(ClientError::Key(_))));
    }
}
