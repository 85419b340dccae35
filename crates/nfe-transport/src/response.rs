//! # Authority Response Schemas
//!
//! Typed views of the result elements returned by each service. Field
//! names follow Rust conventions; the wire names are kept in `serde(rename)`.
//! Only the fields the client acts on are required, so a decode of the
//! wrong wrapper level fails instead of producing an empty value.

use nfe_core::AuthorityStatus;
use serde::{Deserialize, Serialize};

/// Anything carrying `cStat` / `xMotivo`.
pub trait AuthorityReply {
    /// Numeric `cStat`.
    fn status_code(&self) -> u16;

    /// `xMotivo`, verbatim.
    fn message(&self) -> &str;

    /// Decoded status.
    fn status(&self) -> AuthorityStatus {
        AuthorityStatus::from_code(self.status_code())
    }
}

macro_rules! authority_reply {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl AuthorityReply for $ty {
                fn status_code(&self) -> u16 {
                    self.status_code
                }

                fn message(&self) -> &str {
                    &self.message
                }
            }
        )+
    };
}

/// `retConsStatServ`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// `cStat`.
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
    /// `cUF`.
    #[serde(rename = "cUF")]
    pub region_code: u8,
    /// `dhRecbto`.
    #[serde(rename = "dhRecbto", default)]
    pub received_at: Option<String>,
    /// Average processing time in seconds (`tMed`).
    #[serde(rename = "tMed", default)]
    pub average_seconds: Option<u32>,
    /// Expected return of a stopped service (`dhRetorno`).
    #[serde(rename = "dhRetorno", default)]
    pub return_at: Option<String>,
    /// `xObs`.
    #[serde(rename = "xObs", default)]
    pub observation: Option<String>,
}

/// `infProt`: the authority's verdict on one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// `chNFe`.
    #[serde(rename = "chNFe", default)]
    pub key: Option<String>,
    /// `dhRecbto`.
    #[serde(rename = "dhRecbto", default)]
    pub received_at: Option<String>,
    /// `nProt`; present for authorized and denied documents.
    #[serde(rename = "nProt", default)]
    pub protocol: Option<String>,
    /// `digVal`.
    #[serde(rename = "digVal", default)]
    pub digest: Option<String>,
    /// `cStat`.
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
}

/// `protNFe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProtocol {
    /// `infProt`.
    #[serde(rename = "infProt")]
    pub info: ProtocolInfo,
}

/// `infRec`: receipt of an asynchronous batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptInfo {
    /// `nRec`.
    #[serde(rename = "nRec")]
    pub receipt: String,
    /// `tMed`.
    #[serde(rename = "tMed", default)]
    pub average_seconds: Option<u32>,
}

/// `retEnviNFe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// Batch-level `cStat`.
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// Batch-level `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
    /// `cUF`.
    #[serde(rename = "cUF")]
    pub region_code: u8,
    /// `dhRecbto`.
    #[serde(rename = "dhRecbto", default)]
    pub received_at: Option<String>,
    /// Receipt, for asynchronous submission.
    #[serde(rename = "infRec", default)]
    pub receipt: Option<ReceiptInfo>,
    /// Verdict, for synchronous submission.
    #[serde(rename = "protNFe", default)]
    pub protocol: Option<DocumentProtocol>,
}

/// `retConsReciNFe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResultResponse {
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// Echoed receipt.
    #[serde(rename = "nRec", default)]
    pub receipt: Option<String>,
    /// Batch-level `cStat`.
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// Batch-level `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
    /// `cUF`.
    #[serde(rename = "cUF")]
    pub region_code: u8,
    /// `dhRecbto`.
    #[serde(rename = "dhRecbto", default)]
    pub received_at: Option<String>,
    /// One verdict per document in the batch.
    #[serde(rename = "protNFe", default)]
    pub protocols: Vec<DocumentProtocol>,
}

/// `infEvento` inside `retEvento`: outcome of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResult {
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// `cOrgao`.
    #[serde(rename = "cOrgao")]
    pub organ_code: u8,
    /// `cStat`.
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
    /// `chNFe`.
    #[serde(rename = "chNFe", default)]
    pub key: Option<String>,
    /// `tpEvento`.
    #[serde(rename = "tpEvento", default)]
    pub event_code: Option<u32>,
    /// `xEvento`.
    #[serde(rename = "xEvento", default)]
    pub event_description: Option<String>,
    /// `nSeqEvento`.
    #[serde(rename = "nSeqEvento", default)]
    pub sequence: Option<u32>,
    /// `dhRegEvento`.
    #[serde(rename = "dhRegEvento", default)]
    pub registered_at: Option<String>,
    /// `nProt` of the registration.
    #[serde(rename = "nProt", default)]
    pub protocol: Option<String>,
}

/// `retEvento`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResultEnvelope {
    /// `infEvento`.
    #[serde(rename = "infEvento")]
    pub info: EventResult,
}

/// `retEnvEvento`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    /// `idLote`.
    #[serde(rename = "idLote", default)]
    pub lot_id: Option<String>,
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// `cOrgao`.
    #[serde(rename = "cOrgao")]
    pub organ_code: u8,
    /// Batch-level `cStat` (128 when the lot was processed).
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// Batch-level `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
    /// One result per submitted event.
    #[serde(rename = "retEvento", default)]
    pub events: Vec<EventResultEnvelope>,
}

impl EventResponse {
    /// Result for the event with `sequence`, or the only one present.
    pub fn result_for(&self, sequence: u32) -> Option<&EventResult> {
        self.events
            .iter()
            .map(|e| &e.info)
            .find(|r| r.sequence == Some(sequence))
            .or_else(|| match self.events.as_slice() {
                [only] => Some(&only.info),
                _ => None,
            })
    }
}

/// `procEventoNFe` entry within a situation query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredEvent {
    /// `retEvento`.
    #[serde(rename = "retEvento")]
    pub result: EventResultEnvelope,
}

/// `retConsSitNFe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// `cStat`.
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
    /// `cUF`.
    #[serde(rename = "cUF")]
    pub region_code: u8,
    /// `dhRecbto`.
    #[serde(rename = "dhRecbto", default)]
    pub received_at: Option<String>,
    /// `chNFe`.
    #[serde(rename = "chNFe", default)]
    pub key: Option<String>,
    /// Authorization verdict.
    #[serde(rename = "protNFe", default)]
    pub protocol: Option<DocumentProtocol>,
    /// Events registered against the document.
    #[serde(rename = "procEventoNFe", default)]
    pub events: Vec<RegisteredEvent>,
}

/// `infInut` inside `retInutNFe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationResult {
    /// `tpAmb`.
    #[serde(rename = "tpAmb")]
    pub environment: u8,
    /// `verAplic`.
    #[serde(rename = "verAplic", default)]
    pub app_version: String,
    /// `cStat`.
    #[serde(rename = "cStat")]
    pub status_code: u16,
    /// `xMotivo`.
    #[serde(rename = "xMotivo")]
    pub message: String,
    /// `cUF`.
    #[serde(rename = "cUF")]
    pub region_code: u8,
    /// `ano`.
    #[serde(rename = "ano", default)]
    pub year: Option<String>,
    /// `serie`.
    #[serde(rename = "serie", default)]
    pub series: Option<u16>,
    /// `nNFIni`.
    #[serde(rename = "nNFIni", default)]
    pub start: Option<u32>,
    /// `nNFFin`.
    #[serde(rename = "nNFFin", default)]
    pub end: Option<u32>,
    /// `dhRecbto`.
    #[serde(rename = "dhRecbto", default)]
    pub received_at: Option<String>,
    /// `nProt`.
    #[serde(rename = "nProt", default)]
    pub protocol: Option<String>,
}

/// `retInutNFe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationResponse {
    /// `infInut`.
    #[serde(rename = "infInut")]
    pub info: InvalidationResult,
}

impl AuthorityReply for InvalidationResponse {
    fn status_code(&self) -> u16 {
        self.info.status_code
    }

    fn message(&self) -> &str {
        &self.info.message
    }
}

authority_reply!(
    StatusResponse,
    ProtocolInfo,
    AuthorizationResponse,
    AuthorizationResultResponse,
    EventResult,
    EventResponse,
    QueryResponse,
    InvalidationResult,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::extract_result;

    #[test]
    fn status_response_decodes() {
        let raw = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>
<nfeResultMsg xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4">
<retConsStatServ versao="4.00" xmlns="http://www.portalfiscal.inf.br/nfe">
<tpAmb>2</tpAmb><verAplic>SP_NFE_PL009_V4</verAplic><cStat>107</cStat>
<xMotivo>Servico em Operacao</xMotivo><cUF>35</cUF>
<dhRecbto>2024-10-03T14:30:00-03:00</dhRecbto><tMed>1</tMed>
</retConsStatServ></nfeResultMsg></soap:Body></soap:Envelope>"#;
        let status: StatusResponse = extract_result(raw).unwrap();
        assert_eq!(status.status(), AuthorityStatus::ServiceRunning);
        assert_eq!(status.region_code, 35);
        assert_eq!(status.average_seconds, Some(1));
        assert_eq!(status.observation, None);
    }

    #[test]
    fn event_response_with_multiple_results() {
        let raw = r#"<retEnvEvento versao="1.00" xmlns="http://www.portalfiscal.inf.br/nfe">
<idLote>7</idLote><tpAmb>2</tpAmb><verAplic>SVRS</verAplic><cOrgao>35</cOrgao>
<cStat>128</cStat><xMotivo>Lote de Evento Processado</xMotivo>
<retEvento versao="1.00"><infEvento>
<tpAmb>2</tpAmb><verAplic>SVRS</verAplic><cOrgao>35</cOrgao><cStat>135</cStat>
<xMotivo>Evento registrado e vinculado a NF-e</xMotivo>
<chNFe>35241058716523000119550010000001231123456781</chNFe><tpEvento>110110</tpEvento>
<nSeqEvento>1</nSeqEvento><dhRegEvento>2024-10-03T14:31:00-03:00</dhRegEvento>
<nProt>135240000011111</nProt></infEvento></retEvento>
<retEvento versao="1.00"><infEvento>
<tpAmb>2</tpAmb><verAplic>SVRS</verAplic><cOrgao>35</cOrgao><cStat>573</cStat>
<xMotivo>Rejeicao: Duplicidade de Evento</xMotivo><nSeqEvento>2</nSeqEvento>
</infEvento></retEvento>
</retEnvEvento>"#;
        let response: EventResponse = extract_result(raw).unwrap();
        assert_eq!(response.status_code, 128);
        assert_eq!(response.events.len(), 2);
        let first = response.result_for(1).unwrap();
        assert!(first.status().is_event_registered());
        assert_eq!(first.protocol.as_deref(), Some("135240000011111"));
        assert_eq!(response.result_for(2).unwrap().status_code, 573);
        assert!(response.result_for(3).is_none());
    }

    #[test]
    fn invalidation_response_decodes() {
        let raw = r#"<retInutNFe versao="4.00"><infInut>
<tpAmb>2</tpAmb><verAplic>SP</verAplic><cStat>102</cStat>
<xMotivo>Inutilizacao de numero homologado</xMotivo><cUF>35</cUF><ano>24</ano>
<serie>1</serie><nNFIni>50</nNFIni><nNFFin>100</nNFFin><nProt>135240000022222</nProt>
</infInut></retInutNFe>"#;
        let response: InvalidationResponse = extract_result(raw).unwrap();
        assert_eq!(response.status(), AuthorityStatus::InvalidationHomologated);
        assert_eq!(response.info.end, Some(100));
    }
}
