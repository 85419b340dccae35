//! # HTTP Transport
//!
//! [`HttpTransport`] posts SOAP 1.2 envelopes to a resolved
//! [`ServiceEndpoint`] over a `reqwest::Client` configured with the
//! issuer's client certificate.
//!
//! ## Failure classification
//!
//! | Outcome                           | Error                         | Retried |
//! |-----------------------------------|-------------------------------|---------|
//! | client timeout                    | `Timeout`                     | yes     |
//! | connect/reset                     | `ConnectionFailure`           | yes     |
//! | HTTP 502, 503, 504                | `ServiceUnavailable`          | yes     |
//! | retries exhausted on any of these | `Timeout` with `last_cause`   | n/a     |
//! | non-2xx carrying a SOAP fault     | `SoapFault`                   | no      |
//! | any other non-2xx                 | `HttpStatus`                  | no      |
//!
//! A 2xx body is returned raw; the caller decodes it with
//! [`crate::soap::extract_result`]. A well-formed rejection from the
//! authority is a 2xx body and is never retried here.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::endpoint::ServiceEndpoint;
use crate::error::TransportError;
use crate::retry::{send_with_retry, RetryPolicy};
use crate::soap;

const BODY_EXCERPT_LEN: usize = 500;

// ─── Configuration ───────────────────────────────────────────────────

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-attempt timeout, seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause between attempts, milliseconds.
    pub retry_delay_ms: u64,
    /// Overall budget per call, seconds. `None` leaves only the per-attempt
    /// timeout.
    pub call_deadline_secs: Option<u64>,
    /// PEM bundle with the client certificate and its private key.
    pub certificate_path: Option<PathBuf>,
    /// Refuse to build without a certificate.
    pub require_certificate: bool,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 1000,
            call_deadline_secs: None,
            certificate_path: None,
            require_certificate: true,
            user_agent: concat!("nfe-transport/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TransportConfig {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry bounds derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
            deadline: self.call_deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Client certificate for mutual TLS.
#[derive(Clone)]
pub struct ClientCertificate {
    pem: Vec<u8>,
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("pem", &"[REDACTED]")
            .finish()
    }
}

impl ClientCertificate {
    /// Certificate from a PEM bundle holding the chain and a PKCS#8 key.
    ///
    /// # Errors
    ///
    /// [`TransportError::Config`] when the bundle does not parse.
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Result<Self, TransportError> {
        let pem = pem.into();
        reqwest::Identity::from_pem(&pem).map_err(|e| TransportError::Config {
            reason: format!("invalid client certificate: {e}"),
        })?;
        Ok(Self { pem })
    }

    /// Certificate read from `path`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Config`] when the file is unreadable or invalid.
    pub fn from_file(path: &std::path::Path) -> Result<Self, TransportError> {
        let pem = std::fs::read(path).map_err(|e| TransportError::Config {
            reason: format!("cannot read certificate {}: {e}", path.display()),
        })?;
        Self::from_pem(pem)
    }

    fn identity(&self) -> Result<reqwest::Identity, TransportError> {
        reqwest::Identity::from_pem(&self.pem).map_err(|e| TransportError::Config {
            reason: format!("invalid client certificate: {e}"),
        })
    }
}

// ─── Trait ───────────────────────────────────────────────────────────

/// Last request and response, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportExchange {
    /// Target URL.
    pub url: String,
    /// SOAP action.
    pub action: String,
    /// Envelope sent.
    pub request: String,
    /// HTTP status, when a response arrived.
    pub status: Option<u16>,
    /// Raw response body, when one arrived.
    pub response: Option<String>,
}

/// Delivers a payload to an endpoint and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload` to `endpoint`.
    async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TransportError>;

    /// The most recent exchange, overwritten by every call.
    fn last_exchange(&self) -> Option<TransportExchange>;
}

// ─── HTTP implementation ─────────────────────────────────────────────

/// SOAP-over-HTTPS transport.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    policy: RetryPolicy,
    last: Mutex<Option<TransportExchange>>,
}

impl HttpTransport {
    /// Build from `config`, loading the certificate file it names.
    ///
    /// # Errors
    ///
    /// [`TransportError::Config`] when a required certificate is missing or
    /// unreadable, or the HTTP client cannot be built.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let certificate = config
            .certificate_path
            .as_deref()
            .map(ClientCertificate::from_file)
            .transpose()?;
        Self::with_certificate(config, certificate)
    }

    /// Build from `config` with an already-loaded certificate.
    ///
    /// # Errors
    ///
    /// As [`HttpTransport::new`].
    pub fn with_certificate(
        config: &TransportConfig,
        certificate: Option<ClientCertificate>,
    ) -> Result<Self, TransportError> {
        if config.require_certificate && certificate.is_none() {
            return Err(TransportError::Config {
                reason: "a client certificate is required but none is configured".into(),
            });
        }

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone());
        if let Some(cert) = &certificate {
            builder = builder.identity(cert.identity()?);
        }
        let client = builder.build().map_err(|e| TransportError::Config {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            policy: config.retry_policy(),
            last: Mutex::new(None),
        })
    }

    async fn attempt(
        &self,
        endpoint: &ServiceEndpoint,
        envelope: &str,
        attempt: u32,
    ) -> Result<(u16, String), TransportError> {
        let started = std::time::Instant::now();
        let content_type = format!(
            "application/soap+xml; charset=utf-8; action=\"{}\"",
            endpoint.action
        );
        let response = self
            .client
            .post(endpoint.url.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(envelope.to_string())
            .send()
            .await
            .map_err(|e| classify(e, attempt, started))?;

        let status = response.status().as_u16();
        if matches!(status, 502..=504) {
            return Err(TransportError::ServiceUnavailable {
                status,
                attempts: attempt,
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| classify(e, attempt, started))?;
        Ok((status, body))
    }

    fn record(&self, exchange: TransportExchange) {
        *self.last.lock() = Some(exchange);
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        endpoint: &ServiceEndpoint,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TransportError> {
        let envelope = soap::envelope(endpoint.service, payload);
        tracing::debug!(
            url = %endpoint.url,
            action = %endpoint.action,
            service = %endpoint.service,
            "calling authority"
        );

        let outcome = send_with_retry(&self.policy, cancel, |attempt| {
            self.attempt(endpoint, &envelope, attempt)
        })
        .await;

        let mut exchange = TransportExchange {
            url: endpoint.url.to_string(),
            action: endpoint.action.clone(),
            request: envelope.clone(),
            status: None,
            response: None,
        };

        let (status, body) = match outcome {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(url = %endpoint.url, error = %e, "authority call failed");
                self.record(exchange);
                return Err(e);
            }
        };
        exchange.status = Some(status);
        exchange.response = Some(body.clone());
        self.record(exchange);

        if (200..300).contains(&status) {
            tracing::debug!(url = %endpoint.url, status, "authority responded");
            return Ok(body);
        }
        if let Some(fault) = soap::fault(&body) {
            return Err(fault);
        }
        Err(TransportError::HttpStatus {
            status,
            body: body.chars().take(BODY_EXCERPT_LEN).collect(),
        })
    }

    fn last_exchange(&self) -> Option<TransportExchange> {
        self.last.lock().clone()
    }
}

fn classify(err: reqwest::Error, attempt: u32, started: std::time::Instant) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            attempts: attempt,
            elapsed_ms: started.elapsed().as_millis() as u64,
            last_cause: Some(err.to_string()),
        }
    } else {
        TransportError::ConnectionFailure {
            attempts: attempt,
            reason: err.to_string(),
        }
    }
}
