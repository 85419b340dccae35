//! # SOAP 1.2 Envelopes
//!
//! Requests wrap the payload in `nfeDadosMsg` inside a SOAP 1.2 body.
//! Responses arrive in one of two shapes, depending on the authorizer:
//!
//! ```text
//! <Body><retConsStatServ>…</retConsStatServ></Body>                 bare
//! <Body><nfeResultMsg><retConsStatServ>…</retConsStatServ></nfeResultMsg></Body>   wrapped
//! ```
//!
//! [`extract_result`] decodes the body's first element directly and, when
//! that fails, unwraps one level and decodes the child. Both shapes yield
//! the same value.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;

use crate::endpoint::ServiceKind;
use crate::error::TransportError;

/// SOAP 1.2 envelope namespace.
pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

const EXCERPT_LEN: usize = 200;

/// Build the request envelope for `service` around `payload`.
///
/// A leading XML declaration on the payload is dropped.
pub fn envelope(service: ServiceKind, payload: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<soap12:Envelope xmlns:soap12=\"{soap}\">",
            "<soap12:Body>",
            "<nfeDadosMsg xmlns=\"{ns}\">{payload}</nfeDadosMsg>",
            "</soap12:Body>",
            "</soap12:Envelope>"
        ),
        soap = SOAP12_NAMESPACE,
        ns = service.wsdl_namespace(),
        payload = strip_declaration(payload),
    )
}

/// Decode the result element of a SOAP response as `T`.
///
/// # Errors
///
/// - [`TransportError::SoapFault`] when the body carries a fault.
/// - [`TransportError::UnparsableResponse`] when neither the bare nor the
///   wrapped shape decodes.
pub fn extract_result<T: DeserializeOwned>(raw: &str) -> Result<T, TransportError> {
    let body = element_content(raw, "Body").unwrap_or_else(|| strip_declaration(raw));
    let first = first_element(body).ok_or_else(|| unparsable("response body is empty", raw))?;

    if first.local_name == "Fault" {
        return Err(fault_from(first.content));
    }

    let direct_err = match quick_xml::de::from_str::<T>(first.full) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    match first_element(first.content) {
        Some(inner) => quick_xml::de::from_str::<T>(inner.full).map_err(|e| {
            unparsable(
                &format!("bare decode failed ({direct_err}); unwrapped decode failed ({e})"),
                raw,
            )
        }),
        None => Err(unparsable(&direct_err.to_string(), raw)),
    }
}

/// SOAP fault carried by `raw`, if any.
pub fn fault(raw: &str) -> Option<TransportError> {
    let body = element_content(raw, "Body")?;
    let first = first_element(body)?;
    (first.local_name == "Fault").then(|| fault_from(first.content))
}

fn fault_from(content: &str) -> TransportError {
    // SOAP 1.2 nests Code/Value and Reason/Text; 1.1 uses faultcode/faultstring.
    let code = element_content(content, "Code")
        .and_then(|c| element_text(c, "Value"))
        .or_else(|| element_text(content, "faultcode"))
        .unwrap_or_else(|| "unknown".to_string());
    let reason = element_content(content, "Reason")
        .and_then(|r| element_text(r, "Text"))
        .or_else(|| element_text(content, "faultstring"))
        .unwrap_or_default();
    TransportError::SoapFault {
        code: code.trim().to_string(),
        reason: reason.trim().to_string(),
    }
}

fn unparsable(reason: &str, raw: &str) -> TransportError {
    TransportError::UnparsableResponse {
        reason: reason.to_string(),
        excerpt: raw.chars().take(EXCERPT_LEN).collect(),
    }
}

pub(crate) fn strip_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}

// ─── Element scanning ────────────────────────────────────────────────

struct Element<'a> {
    local_name: String,
    /// The element including its tags.
    full: &'a str,
    /// Everything between the start and end tags.
    content: &'a str,
}

/// First top-level element in `xml`, skipping declarations, comments and
/// text.
fn first_element(xml: &str) -> Option<Element<'_>> {
    find_element(xml, |depth, _| depth == 0)
}

/// Content of the first element, at any depth, whose local name is `local`.
fn element_content<'a>(xml: &'a str, local: &str) -> Option<&'a str> {
    find_element(xml, |_, name| name == local.as_bytes()).map(|e| e.content)
}

/// Unescaped text of the first element named `local`, CDATA included.
fn element_text(xml: &str, local: &str) -> Option<String> {
    let content = element_content(xml, local)?;
    let mut reader = Reader::from_str(content);
    let mut text = String::new();
    loop {
        match reader.read_event().ok()? {
            Event::Text(t) => text.push_str(&t.unescape().ok()?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::Eof => return Some(text),
            _ => {}
        }
    }
}

/// First element accepted by `wanted(depth, local_name)`, located with the
/// reader and sliced out of `xml` by position.
fn find_element<'a>(xml: &'a str, wanted: impl Fn(usize, &[u8]) -> bool) -> Option<Element<'a>> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    loop {
        let (start, empty) = match reader.read_event().ok()? {
            Event::Start(start) => (start, false),
            Event::Empty(start) => (start, true),
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => return None,
            _ => continue,
        };
        if !wanted(depth, start.local_name().as_ref()) {
            if !empty {
                depth += 1;
            }
            continue;
        }

        let tag_end = reader.buffer_position() as usize;
        // A start tag holds no '<' of its own, even inside attribute values.
        let begin = xml[..tag_end].rfind('<')?;
        let local_name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        if empty {
            return Some(Element {
                local_name,
                full: &xml[begin..tag_end],
                content: "",
            });
        }
        let span = reader.read_to_end(start.name()).ok()?;
        let end = reader.buffer_position() as usize;
        return Some(Element {
            local_name,
            full: &xml[begin..end],
            content: &xml[span.start as usize..span.end as usize],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        #[serde(rename = "cStat")]
        status: u16,
        #[serde(rename = "xMotivo")]
        message: String,
    }

    const BARE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <retConsStatServ xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
      <cStat>107</cStat><xMotivo>Servico em Operacao</xMotivo>
    </retConsStatServ>
  </soap:Body>
</soap:Envelope>"#;

    const WRAPPED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Header/>
  <env:Body>
    <nfeResultMsg xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4">
      <retConsStatServ xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
        <cStat>107</cStat><xMotivo>Servico em Operacao</xMotivo>
      </retConsStatServ>
    </nfeResultMsg>
  </env:Body>
</env:Envelope>"#;

    #[test]
    fn envelope_carries_payload_and_namespace() {
        let env = envelope(ServiceKind::Status, "<?xml version=\"1.0\"?><consStatServ/>");
        assert!(env.contains(
            "<nfeDadosMsg xmlns=\"http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4\"><consStatServ/></nfeDadosMsg>"
        ));
        assert_eq!(env.matches("<?xml").count(), 1);
    }

    #[test]
    fn bare_and_wrapped_decode_identically() {
        let bare: Probe = extract_result(BARE).unwrap();
        let wrapped: Probe = extract_result(WRAPPED).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare.status, 107);
        assert_eq!(bare.message, "Servico em Operacao");
    }

    #[test]
    fn body_without_envelope_decodes() {
        let raw = "<retConsStatServ><cStat>107</cStat><xMotivo>ok</xMotivo></retConsStatServ>";
        let probe: Probe = extract_result(raw).unwrap();
        assert_eq!(probe.status, 107);
    }

    #[test]
    fn foreign_payload_is_unparsable() {
        let raw = concat!(
            "<soap:Envelope xmlns:soap=\"x\">",
            "<soap:Body><html>oops</html></soap:Body></soap:Envelope>"
        );
        assert!(matches!(
            extract_result::<Probe>(raw),
            Err(TransportError::UnparsableResponse { .. })
        ));
        assert!(matches!(
            extract_result::<Probe>("   "),
            Err(TransportError::UnparsableResponse { .. })
        ));
    }

    #[test]
    fn soap12_fault_is_surfaced() {
        let raw = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>
<soap:Fault><soap:Code><soap:Value>soap:Receiver</soap:Value></soap:Code>
<soap:Reason><soap:Text xml:lang="pt">Erro interno</soap:Text></soap:Reason></soap:Fault>
</soap:Body></soap:Envelope>"#;
        assert_eq!(
            extract_result::<Probe>(raw),
            Err(TransportError::SoapFault {
                code: "soap:Receiver".into(),
                reason: "Erro interno".into()
            })
        );
        assert!(fault(raw).is_some());
        assert!(fault(BARE).is_none());
    }

    #[test]
    fn first_of_same_named_siblings_is_decoded_alone() {
        let raw = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body>
<retConsStatServ><cStat>107</cStat><xMotivo>primeiro</xMotivo></retConsStatServ>
<retConsStatServ><cStat>108</cStat><xMotivo>segundo</xMotivo></retConsStatServ>
</env:Body></env:Envelope>"#;
        let first: Probe = extract_result(raw).unwrap();
        assert_eq!(first.status, 107);
        assert_eq!(first.message, "primeiro");
    }

    #[test]
    fn nested_same_name_closes_at_its_own_end_tag() {
        let xml = "<a><a>inner</a></a><a>next</a>";
        let outer = first_element(xml).unwrap();
        assert_eq!(outer.full, "<a><a>inner</a></a>");
        assert_eq!(outer.content, "<a>inner</a>");
        assert_eq!(element_content(xml, "a"), Some("<a>inner</a>"));
    }

    #[test]
    fn attribute_values_and_cdata_do_not_confuse_the_scanner() {
        let raw = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"><soap:Body>
<soap:Fault note="a>b"><soap:Code><soap:Value>soap:Sender</soap:Value></soap:Code>
<soap:Reason><soap:Text xml:lang="pt"><![CDATA[Falha </soap:Text> no lote]]></soap:Text></soap:Reason></soap:Fault>
</soap:Body></soap:Envelope>"#;
        assert_eq!(
            fault(raw),
            Some(TransportError::SoapFault {
                code: "soap:Sender".into(),
                reason: "Falha </soap:Text> no lote".into()
            })
        );
    }

    #[test]
    fn soap11_fault_text_is_unescaped() {
        let raw = "<Envelope><Body><Fault><faultcode>Server</faultcode>\
                   <faultstring>Erro &amp; falha</faultstring></Fault></Body></Envelope>";
        assert_eq!(
            extract_result::<Probe>(raw),
            Err(TransportError::SoapFault {
                code: "Server".into(),
                reason: "Erro & falha".into()
            })
        );
    }
}
