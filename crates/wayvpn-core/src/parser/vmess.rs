// `vmess://` carries a base64-wrapped JSON document instead of a URL.

use serde_json::{Map, Value};

use super::Endpoint;
use super::decode::{base64_to_string, parse_port, percent};
use crate::error::ParseError;
use crate::model::Protocol;

/// Non-secret transport keys copied into `params`.
const TRANSPORT_KEYS: &[&str] = &[
    "net", "type", "tls", "sni", "host", "path", "aid", "scy", "alpn", "fp",
];

pub(super) fn parse(rest: &str) -> Result<Endpoint, ParseError> {
    let (payload, fragment) = match rest.split_once('#') {
        Some((payload, fragment)) => (payload, Some(fragment)),
        None => (rest, None),
    };
    let payload = payload.split_once('?').map_or(payload, |(head, _)| head);

    let json = base64_to_string(payload)?;
    let doc: Map<String, Value> = serde_json::from_str(&json)
        .map_err(|e| ParseError::malformed(format!("invalid vmess document: {e}")))?;

    let address = field(&doc, "add").ok_or_else(|| ParseError::malformed("missing address"))?;
    let address = address.trim_start_matches('[').trim_end_matches(']').to_owned();
    let port = field(&doc, "port").ok_or_else(|| ParseError::malformed("missing port"))?;
    let port = parse_port(&port)?;
    if field(&doc, "id").is_none() {
        return Err(ParseError::malformed("missing user id"));
    }

    let mut endpoint = Endpoint::new(Protocol::Vmess, address, port);
    endpoint.name = field(&doc, "ps").or_else(|| fragment.map(|f| percent(f).trim().to_owned()));
    for key in TRANSPORT_KEYS {
        if let Some(value) = field(&doc, key) {
            endpoint.param(key, &value);
        }
    }
    Ok(endpoint)
}

/// String or number field, trimmed; empty strings count as absent.
fn field(doc: &Map<String, Value>, key: &str) -> Option<String> {
    match doc.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
