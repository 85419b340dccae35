//! # HTTP Transport Integration Tests
//!
//! Exercises [`HttpTransport`] against wiremock servers: request shape,
//! retry of transient failures, non-retry of well-formed rejections, SOAP
//! faults, and the diagnostic exchange record.

use std::time::Duration;

use nfe_transport::soap::extract_result;
use nfe_transport::{
    AuthorityReply, CancellationToken, HttpTransport, ServiceEndpoint, ServiceKind,
    StatusResponse, Transport, TransportConfig, TransportError,
};
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATUS_OK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>
<nfeResultMsg xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4">
<retConsStatServ versao="4.00" xmlns="http://www.portalfiscal.inf.br/nfe">
<tpAmb>2</tpAmb><verAplic>SP_NFE_PL009_V4</verAplic><cStat>107</cStat>
<xMotivo>Servico em Operacao</xMotivo><cUF>35</cUF></retConsStatServ>
</nfeResultMsg></soap:Body></soap:Envelope>"#;

const STATUS_REJECTED: &str = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>
<retConsStatServ versao="4.00"><tpAmb>2</tpAmb><cStat>656</cStat>
<xMotivo>Rejeicao: Consumo Indevido</xMotivo><cUF>35</cUF></retConsStatServ>
</soap:Body></soap:Envelope>"#;

const FAULT: &str = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>
<soap:Fault><soap:Code><soap:Value>soap:Sender</soap:Value></soap:Code>
<soap:Reason><soap:Text>Certificado nao reconhecido</soap:Text></soap:Reason></soap:Fault>
</soap:Body></soap:Envelope>"#;

const PAYLOAD: &str = r#"<consStatServ xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00"><tpAmb>2</tpAmb><cUF>35</cUF><xServ>STATUS</xServ></consStatServ>"#;

fn transport(max_retries: u32, timeout_secs: u64) -> HttpTransport {
    init_tracing();
    let config = TransportConfig {
        timeout_secs,
        max_retries,
        retry_delay_ms: 10,
        require_certificate: false,
        ..TransportConfig::default()
    };
    HttpTransport::new(&config).expect("transport")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn endpoint(base: &str) -> ServiceEndpoint {
    ServiceEndpoint {
        url: Url::parse(&format!("{base}/ws/NfeStatusServico4.asmx")).expect("url"),
        action: ServiceKind::Status.default_action(),
        service: ServiceKind::Status,
    }
}

#[tokio::test]
async fn posts_soap12_envelope_and_parses_wrapped_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ws/NfeStatusServico4.asmx"))
        .and(header(
            "content-type",
            "application/soap+xml; charset=utf-8; action=\"http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4/nfeStatusServicoNF\"",
        ))
        .and(body_string_contains(
            "<nfeDadosMsg xmlns=\"http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4\">",
        ))
        .and(body_string_contains("<xServ>STATUS</xServ>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATUS_OK))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(2, 5);
    let raw = transport
        .call(&endpoint(&server.uri()), PAYLOAD, &CancellationToken::new())
        .await
        .expect("call");
    let status: StatusResponse = extract_result(&raw).expect("decode");
    assert_eq!(status.status_code(), 107);
    assert!(status.status().is_service_available());

    let exchange = transport.last_exchange().expect("exchange recorded");
    assert_eq!(exchange.status, Some(200));
    assert!(exchange.request.contains("<soap12:Envelope"));
    assert_eq!(exchange.response.as_deref(), Some(STATUS_OK));
}

#[tokio::test]
async fn gateway_errors_are_retried_up_to_the_bound_then_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = transport(2, 5)
        .call(&endpoint(&server.uri()), PAYLOAD, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        TransportError::Timeout {
            attempts: 3,
            last_cause: Some(cause),
            ..
        } => assert!(cause.contains("HTTP 503"), "{cause}"),
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_authority_surfaces_timeout_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(STATUS_OK)
                .set_delay(Duration::from_secs(3)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let err = transport(1, 1)
        .call(&endpoint(&server.uri()), PAYLOAD, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { attempts: 2, .. }), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_retried_then_times_out() {
    let transport = transport(2, 1);
    let err = transport
        .call(&endpoint("http://127.0.0.1:1"), PAYLOAD, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { attempts: 3, .. }), "{err:?}");
    let exchange = transport.last_exchange().expect("exchange recorded");
    assert_eq!(exchange.response, None);
}

#[tokio::test]
async fn well_formed_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATUS_REJECTED))
        .expect(1)
        .mount(&server)
        .await;

    let raw = transport(2, 5)
        .call(&endpoint(&server.uri()), PAYLOAD, &CancellationToken::new())
        .await
        .expect("rejections are delivered, not raised");
    let status: StatusResponse = extract_result(&raw).expect("decode");
    assert_eq!(status.status_code(), 656);
    assert_eq!(status.message(), "Rejeicao: Consumo Indevido");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request"))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(2, 5)
        .call(&endpoint(&server.uri()), PAYLOAD, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::HttpStatus {
            status: 400,
            body: "Bad Request".into()
        }
    );
}

#[tokio::test]
async fn soap_fault_is_surfaced_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string(FAULT))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(2, 5)
        .call(&endpoint(&server.uri()), PAYLOAD, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::SoapFault {
            code: "soap:Sender".into(),
            reason: "Certificado nao reconhecido".into()
        }
    );
}

#[tokio::test]
async fn cancelled_token_aborts_before_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATUS_OK))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = transport(2, 5)
        .call(&endpoint(&server.uri()), PAYLOAD, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Cancelled { attempts: 1 });
}
