//! Request payloads for the document services.
//!
//! Event and invalidation messages are rendered by `nfe-events`; these are
//! the remaining four: status, situation query, batch submission, and
//! receipt query. Every value written here is a validated code or digit
//! string, so no escaping is needed.

use nfe_core::{AccessKey, Environment, Region};
use nfe_events::message::{MAX_LOT_ID, NFE_NAMESPACE};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ClientError;

/// `versao` of the document service schemas.
pub const SERVICE_SCHEMA_VERSION: &str = "4.00";

const RECEIPT_LEN: usize = 15;

/// `consStatServ`.
pub fn status_request(environment: Environment, region: Region) -> String {
    format!(
        "<consStatServ xmlns=\"{NFE_NAMESPACE}\" versao=\"{SERVICE_SCHEMA_VERSION}\">\
         <tpAmb>{}</tpAmb><cUF>{}</cUF><xServ>STATUS</xServ></consStatServ>",
        environment.code(),
        region.code_str(),
    )
}

/// `consSitNFe`.
pub fn query_request(environment: Environment, key: &AccessKey) -> String {
    format!(
        "<consSitNFe xmlns=\"{NFE_NAMESPACE}\" versao=\"{SERVICE_SCHEMA_VERSION}\">\
         <tpAmb>{}</tpAmb><xServ>CONSULTAR</xServ><chNFe>{key}</chNFe></consSitNFe>",
        environment.code(),
    )
}

/// `enviNFe` around one signed document.
///
/// # Errors
///
/// [`ClientError::InvalidInput`] when `lot_id` exceeds 15 digits or the
/// document is not well-formed XML.
pub fn authorization_request(
    lot_id: u64,
    synchronous: bool,
    signed_document: &str,
) -> Result<String, ClientError> {
    check_lot_id(lot_id)?;
    ensure_well_formed(signed_document)?;
    Ok(format!(
        "<enviNFe xmlns=\"{NFE_NAMESPACE}\" versao=\"{SERVICE_SCHEMA_VERSION}\">\
         <idLote>{lot_id}</idLote><indSinc>{}</indSinc>{}</enviNFe>",
        u8::from(synchronous),
        strip_declaration(signed_document),
    ))
}

/// `consReciNFe`.
///
/// # Errors
///
/// [`ClientError::InvalidInput`] unless `receipt` is 15 digits.
pub fn receipt_request(environment: Environment, receipt: &str) -> Result<String, ClientError> {
    if receipt.len() != RECEIPT_LEN || !receipt.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ClientError::InvalidInput {
            field: "nRec",
            reason: format!("expected {RECEIPT_LEN} digits, got {receipt:?}"),
        });
    }
    Ok(format!(
        "<consReciNFe xmlns=\"{NFE_NAMESPACE}\" versao=\"{SERVICE_SCHEMA_VERSION}\">\
         <tpAmb>{}</tpAmb><nRec>{receipt}</nRec></consReciNFe>",
        environment.code(),
    ))
}

pub(crate) fn check_lot_id(lot_id: u64) -> Result<(), ClientError> {
    if lot_id > MAX_LOT_ID {
        return Err(ClientError::InvalidInput {
            field: "idLote",
            reason: format!("lot id {lot_id} exceeds 15 digits"),
        });
    }
    Ok(())
}

/// Parse `xml` to the end, failing on the first syntax error or
/// mismatched end tag.
pub(crate) fn ensure_well_formed(xml: &str) -> Result<(), ClientError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) if depth == 0 => return Ok(()),
            Ok(Event::Eof) => {
                return Err(ClientError::InvalidInput {
                    field: "document",
                    reason: format!("{depth} unclosed elements"),
                })
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ClientError::InvalidInput {
                    field: "document",
                    reason: format!(
                        "malformed XML at byte {}: {e}",
                        reader.buffer_position()
                    ),
                })
            }
        }
    }
}

fn strip_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
