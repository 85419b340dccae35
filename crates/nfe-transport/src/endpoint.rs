//! # Endpoint Resolution
//!
//! Maps `(region, environment, model, service, channel)` to a
//! [`ServiceEndpoint`]: the URL to POST to and the SOAP action to announce.
//!
//! ## Sources and priority
//!
//! An [`EndpointSource`] answers lookups for the regions it knows. A
//! [`ResolverChain`] holds an ordered list of sources fixed at construction
//! and asks each in turn; the first `Some` wins. Overrides go first and the
//! primary table last, so a new service kind or a moved URL can be added
//! without touching the primary data.
//!
//! ## Authorizers
//!
//! States do not all run their own services. [`EndpointTable`] maps each
//! region to an authorizer name (its own, or a shared virtual authorizer)
//! and lists URLs per authorizer. In SVC contingency the `SVC-AN` or
//! `SVC-RS` authorizer answers instead of the region's own. The URLs
//! themselves are deployment data, supplied as YAML:
//!
//! ```yaml
//! regions:
//!   SP: SP
//!   AC: SVRS
//! authorizers:
//!   SP:
//!     - environment: production
//!       service: authorization
//!       url: https://nfe.fazenda.sp.gov.br/ws/nfeautorizacao4.asmx
//!   SVRS:
//!     - environment: staging
//!       model: "65"
//!       service: status
//!       url: https://nfce-homologacao.svrs.rs.gov.br/ws/NfeStatusServico/NfeStatusServico4.asmx
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nfe_core::{DocumentModel, Environment, Region};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::contingency::ContingencyMode;
use crate::error::ResolveError;

/// WSDL namespace prefix shared by every service.
pub const WSDL_NAMESPACE_BASE: &str = "http://www.portalfiscal.inf.br/nfe/wsdl";

/// Authorizer answering in SVC-AN contingency.
pub const SVC_AN_AUTHORIZER: &str = "SVC-AN";

/// Authorizer answering in SVC-RS contingency.
pub const SVC_RS_AUTHORIZER: &str = "SVC-RS";

// ─── Service kinds ───────────────────────────────────────────────────

/// Remote operations offered by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Service availability probe.
    Status,
    /// Document batch submission.
    Authorization,
    /// Polling of an asynchronous batch by receipt.
    AuthorizationResult,
    /// Document situation by access key.
    Query,
    /// Number range invalidation.
    Invalidation,
    /// Event batch submission.
    EventReception,
}

impl ServiceKind {
    /// WSDL service name.
    pub fn wsdl_service(self) -> &'static str {
        match self {
            Self::Status => "NFeStatusServico4",
            Self::Authorization => "NFeAutorizacao4",
            Self::AuthorizationResult => "NFeRetAutorizacao4",
            Self::Query => "NFeConsultaProtocolo4",
            Self::Invalidation => "NFeInutilizacao4",
            Self::EventReception => "NFeRecepcaoEvento4",
        }
    }

    /// WSDL operation name.
    pub fn wsdl_operation(self) -> &'static str {
        match self {
            Self::Status => "nfeStatusServicoNF",
            Self::Authorization => "nfeAutorizacaoLote",
            Self::AuthorizationResult => "nfeRetAutorizacaoLote",
            Self::Query => "nfeConsultaNF",
            Self::Invalidation => "nfeInutilizacaoNF",
            Self::EventReception => "nfeRecepcaoEvento",
        }
    }

    /// Namespace of the `nfeDadosMsg` body element.
    pub fn wsdl_namespace(self) -> String {
        format!("{WSDL_NAMESPACE_BASE}/{}", self.wsdl_service())
    }

    /// SOAP action used when a table entry does not set one.
    pub fn default_action(self) -> String {
        format!("{}/{}", self.wsdl_namespace(), self.wsdl_operation())
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Status => "status",
            Self::Authorization => "authorization",
            Self::AuthorizationResult => "authorization_result",
            Self::Query => "query",
            Self::Invalidation => "invalidation",
            Self::EventReception => "event_reception",
        };
        f.write_str(name)
    }
}

/// Which path a call takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// The region's own authorizer.
    Primary,
    /// An alternate path while the primary is marked down.
    Contingency(ContingencyMode),
}

// ─── Query and result ────────────────────────────────────────────────

/// Everything a lookup is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointQuery {
    /// Issuer region.
    pub region: Region,
    /// Target environment.
    pub environment: Environment,
    /// Document model.
    pub model: DocumentModel,
    /// Remote operation.
    pub service: ServiceKind,
    /// Routing channel.
    pub channel: Channel,
}

impl EndpointQuery {
    /// Primary-channel query.
    pub fn new(
        region: Region,
        environment: Environment,
        model: DocumentModel,
        service: ServiceKind,
    ) -> Self {
        Self {
            region,
            environment,
            model,
            service,
            channel: Channel::Primary,
        }
    }

    /// Same query over `channel`.
    pub fn via(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

/// A resolved endpoint. Recomputed per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// URL to POST to.
    pub url: Url,
    /// SOAP action.
    pub action: String,
    /// Operation this endpoint serves.
    pub service: ServiceKind,
}

/// A source of endpoint mappings.
pub trait EndpointSource: Send + Sync {
    /// Endpoint for `query`, if this source has one.
    fn lookup(&self, query: &EndpointQuery) -> Option<ServiceEndpoint>;

    /// Whether this source maps `region` at all.
    fn knows_region(&self, region: Region) -> bool;
}

// ─── Table ───────────────────────────────────────────────────────────

/// One row of an authorizer's endpoint list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    /// Environment this URL serves.
    pub environment: Environment,
    /// Model restriction; `None` serves both.
    #[serde(default)]
    pub model: Option<DocumentModel>,
    /// Operation.
    pub service: ServiceKind,
    /// URL.
    pub url: Url,
    /// SOAP action override.
    #[serde(default)]
    pub action: Option<String>,
}

impl EndpointEntry {
    fn matches(&self, query: &EndpointQuery) -> bool {
        self.environment == query.environment
            && self.service == query.service
            && self.model.map_or(true, |m| m == query.model)
    }

    fn to_endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint {
            url: self.url.clone(),
            action: self
                .action
                .clone()
                .unwrap_or_else(|| self.service.default_action()),
            service: self.service,
        }
    }
}

/// Data-driven endpoint source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTable {
    /// Region to authorizer name.
    #[serde(default)]
    pub regions: HashMap<Region, String>,
    /// Authorizer name to its endpoints.
    #[serde(default)]
    pub authorizers: HashMap<String, Vec<EndpointEntry>>,
}

impl EndpointTable {
    /// Parse a YAML table.
    ///
    /// # Errors
    ///
    /// [`ResolveError::InvalidTable`] on malformed YAML or a region mapped to
    /// an authorizer with no entries.
    pub fn from_yaml(input: &str) -> Result<Self, ResolveError> {
        let table: Self = serde_yaml::from_str(input).map_err(|e| ResolveError::InvalidTable {
            reason: e.to_string(),
        })?;
        for (region, authorizer) in &table.regions {
            if !table.authorizers.contains_key(authorizer) {
                return Err(ResolveError::InvalidTable {
                    reason: format!("region {region} maps to unlisted authorizer {authorizer}"),
                });
            }
        }
        Ok(table)
    }

    /// Authorizer answering `query`, accounting for SVC contingency.
    fn authorizer_for(&self, query: &EndpointQuery) -> Option<&str> {
        match query.channel {
            Channel::Contingency(ContingencyMode::SvcAn) => Some(SVC_AN_AUTHORIZER),
            Channel::Contingency(ContingencyMode::SvcRs) => Some(SVC_RS_AUTHORIZER),
            Channel::Primary | Channel::Contingency(_) => {
                self.regions.get(&query.region).map(String::as_str)
            }
        }
    }
}

impl EndpointSource for EndpointTable {
    fn lookup(&self, query: &EndpointQuery) -> Option<ServiceEndpoint> {
        if !self.knows_region(query.region) {
            return None;
        }
        let authorizer = self.authorizer_for(query)?;
        self.authorizers
            .get(authorizer)?
            .iter()
            .find(|entry| entry.matches(query))
            .map(EndpointEntry::to_endpoint)
    }

    fn knows_region(&self, region: Region) -> bool {
        self.regions.contains_key(&region)
    }
}

// ─── Chain ───────────────────────────────────────────────────────────

/// Ordered sources; the first answer wins.
#[derive(Clone, Default)]
pub struct ResolverChain {
    sources: Vec<Arc<dyn EndpointSource>>,
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverChain")
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl ResolverChain {
    /// Chain over `sources` in priority order.
    pub fn new(sources: Vec<Arc<dyn EndpointSource>>) -> Self {
        Self { sources }
    }

    /// Chain with a single primary source.
    pub fn primary(source: impl EndpointSource + 'static) -> Self {
        Self::new(vec![Arc::new(source)])
    }

    /// Put `source` ahead of every existing source.
    pub fn with_override(mut self, source: impl EndpointSource + 'static) -> Self {
        self.sources.insert(0, Arc::new(source));
        self
    }

    /// Resolve `query`.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::UnknownRegion`] when no source maps the region.
    /// - [`ResolveError::UnsupportedServiceForModel`] when some source maps
    ///   it but none has an entry for the query.
    pub fn resolve(&self, query: &EndpointQuery) -> Result<ServiceEndpoint, ResolveError> {
        if let Some(endpoint) = self.sources.iter().find_map(|s| s.lookup(query)) {
            tracing::debug!(
                region = %query.region,
                service = %query.service,
                channel = ?query.channel,
                url = %endpoint.url,
                "endpoint resolved"
            );
            return Ok(endpoint);
        }
        if !self.sources.iter().any(|s| s.knows_region(query.region)) {
            return Err(ResolveError::UnknownRegion {
                region: query.region,
            });
        }
        Err(ResolveError::UnsupportedServiceForModel {
            region: query.region,
            model: query.model,
            service: query.service,
            environment: query.environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
regions:
  SP: SP
  AC: SVRS
  RS: SVRS
authorizers:
  SP:
    - environment: staging
      service: status
      url: https://homologacao.nfe.fazenda.sp.gov.br/ws/nfestatusservico4.asmx
    - environment: staging
      model: "55"
      service: authorization
      url: https://homologacao.nfe.fazenda.sp.gov.br/ws/nfeautorizacao4.asmx
  SVRS:
    - environment: staging
      service: status
      url: https://nfe-homologacao.svrs.rs.gov.br/ws/NfeStatusServico/NfeStatusServico4.asmx
      action: urn:custom-status
  SVC-AN:
    - environment: staging
      service: authorization
      url: https://hom.svc.fazenda.gov.br/NFeAutorizacao4/NFeAutorizacao4.asmx
"#;

    fn chain() -> ResolverChain {
        ResolverChain::primary(EndpointTable::from_yaml(TABLE).unwrap())
    }

    fn query(region: Region, model: DocumentModel, service: ServiceKind) -> EndpointQuery {
        EndpointQuery::new(region, Environment::Staging, model, service)
    }

    #[test]
    fn resolves_region_own_authorizer_with_default_action() {
        let ep = chain()
            .resolve(&query(Region::SaoPaulo, DocumentModel::Nfe, ServiceKind::Authorization))
            .unwrap();
        assert_eq!(ep.url.host_str(), Some("homologacao.nfe.fazenda.sp.gov.br"));
        assert_eq!(
            ep.action,
            "http://www.portalfiscal.inf.br/nfe/wsdl/NFeAutorizacao4/nfeAutorizacaoLote"
        );
    }

    #[test]
    fn shared_authorizer_and_action_override() {
        let ep = chain()
            .resolve(&query(Region::Acre, DocumentModel::Nfe, ServiceKind::Status))
            .unwrap();
        assert_eq!(ep.url.host_str(), Some("nfe-homologacao.svrs.rs.gov.br"));
        assert_eq!(ep.action, "urn:custom-status");
    }

    #[test]
    fn unknown_region_is_an_error() {
        assert_eq!(
            chain().resolve(&query(Region::Bahia, DocumentModel::Nfe, ServiceKind::Status)),
            Err(ResolveError::UnknownRegion {
                region: Region::Bahia
            })
        );
    }

    #[test]
    fn missing_entry_is_unsupported_for_model() {
        let err = chain()
            .resolve(&query(Region::SaoPaulo, DocumentModel::Nfce, ServiceKind::Authorization))
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnsupportedServiceForModel {
                model: DocumentModel::Nfce,
                ..
            }
        ));
    }

    #[test]
    fn svc_channel_routes_to_virtual_authorizer() {
        let q = query(Region::SaoPaulo, DocumentModel::Nfe, ServiceKind::Authorization)
            .via(Channel::Contingency(ContingencyMode::SvcAn));
        let ep = chain().resolve(&q).unwrap();
        assert_eq!(ep.url.host_str(), Some("hom.svc.fazenda.gov.br"));
    }

    #[test]
    fn override_source_answers_first() {
        struct Overrides;
        impl EndpointSource for Overrides {
            fn lookup(&self, query: &EndpointQuery) -> Option<ServiceEndpoint> {
                (query.service == ServiceKind::Query).then(|| ServiceEndpoint {
                    url: Url::parse("https://override.example/consulta").unwrap(),
                    action: query.service.default_action(),
                    service: query.service,
                })
            }
            fn knows_region(&self, _region: Region) -> bool {
                false
            }
        }

        let chain = chain().with_override(Overrides);
        let ep = chain
            .resolve(&query(Region::SaoPaulo, DocumentModel::Nfe, ServiceKind::Query))
            .unwrap();
        assert_eq!(ep.url.host_str(), Some("override.example"));
        // Everything else falls through to the table.
        assert!(chain
            .resolve(&query(Region::SaoPaulo, DocumentModel::Nfe, ServiceKind::Status))
            .is_ok());
    }

    #[test]
    fn table_rejects_dangling_authorizer() {
        let yaml = "regions:\n  SP: NOWHERE\nauthorizers: {}\n";
        assert!(matches!(
            EndpointTable::from_yaml(yaml),
            Err(ResolveError::InvalidTable { .. })
        ));
    }
}
