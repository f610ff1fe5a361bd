// `ss://` in both SIP002 (`userinfo@host:port`) and legacy (fully base64) forms.

use super::Endpoint;
use super::decode::{base64_to_string, percent, split_host_port};
use crate::error::ParseError;
use crate::model::Protocol;

pub(super) fn parse(rest: &str) -> Result<Endpoint, ParseError> {
    let (body, name) = match rest.split_once('#') {
        Some((body, fragment)) => (body, Some(percent(fragment).trim().to_owned())),
        None => (rest, None),
    };
    let (body, query) = match body.split_once('?') {
        Some((body, query)) => (body, Some(query)),
        None => (body, None),
    };
    let body = body.trim_end_matches('/');

    let (userinfo, host_port) = if let Some((userinfo, host_port)) = body.rsplit_once('@') {
        (decode_userinfo(userinfo)?, host_port.to_owned())
    } else {
        let decoded = base64_to_string(body)?;
        let (userinfo, host_port) = decoded
            .rsplit_once('@')
            .ok_or_else(|| ParseError::malformed("missing server address"))?;
        (userinfo.to_owned(), host_port.to_owned())
    };

    let (method, password) = userinfo
        .split_once(':')
        .ok_or_else(|| ParseError::malformed("missing method or password"))?;
    if method.trim().is_empty() {
        return Err(ParseError::malformed("missing cipher method"));
    }
    if password.is_empty() {
        return Err(ParseError::malformed("missing password"));
    }

    let (address, port) = split_host_port(&host_port)?;
    let mut endpoint = Endpoint::new(Protocol::Shadowsocks, address, port);
    endpoint.name = name;
    endpoint.param("method", method);
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            endpoint.param(&key, &value);
        }
    }
    Ok(endpoint)
}

/// SIP002 userinfo is base64 for stream/AEAD ciphers, percent-encoded
/// plain text for 2022 ciphers.
fn decode_userinfo(userinfo: &str) -> Result<String, ParseError> {
    let decoded = percent(userinfo);
    if decoded.contains(':') {
        Ok(decoded)
    } else {
        base64_to_string(&decoded)
    }
}
