// URL-shaped schemes: `scheme://userinfo@host:port?query#name`.

use url::Url;

use super::Endpoint;
use super::decode::percent;
use crate::error::ParseError;
use crate::model::Protocol;

/// Authority-form descriptor after `url` has validated it.
struct UrlParts {
    url: Url,
    address: String,
    port: u16,
    userinfo: String,
}

fn url_parts(raw: &str) -> Result<UrlParts, ParseError> {
    let url = Url::parse(raw).map_err(|e| ParseError::malformed(format!("invalid URI: {e}")))?;

    let address = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_owned())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ParseError::malformed("missing address"))?;

    let port = match url.port() {
        Some(0) | None => return Err(ParseError::malformed("missing port")),
        Some(port) => port,
    };

    let mut userinfo = percent(url.username());
    if let Some(password) = url.password() {
        userinfo.push(':');
        userinfo.push_str(&percent(password));
    }

    Ok(UrlParts {
        url,
        address,
        port,
        userinfo,
    })
}

fn endpoint(protocol: Protocol, parts: &UrlParts) -> Endpoint {
    let mut endpoint = Endpoint::new(protocol, parts.address.clone(), parts.port);
    endpoint.name = parts
        .url
        .fragment()
        .map(|f| percent(f).trim().to_owned());
    for (key, value) in parts.url.query_pairs() {
        endpoint.param(&key, &value);
    }
    endpoint
}

pub(super) fn parse_vless(raw: &str) -> Result<Endpoint, ParseError> {
    let parts = url_parts(raw)?;
    if parts.userinfo.trim().is_empty() {
        return Err(ParseError::malformed("missing user id"));
    }
    Ok(endpoint(Protocol::Vless, &parts))
}

pub(super) fn parse_trojan(raw: &str) -> Result<Endpoint, ParseError> {
    let parts = url_parts(raw)?;
    if parts.userinfo.trim().is_empty() {
        return Err(ParseError::malformed("missing password"));
    }
    Ok(endpoint(Protocol::Trojan, &parts))
}

pub(super) fn parse_wireguard(raw: &str) -> Result<Endpoint, ParseError> {
    let parts = url_parts(raw)?;
    if parts.userinfo.trim().is_empty() {
        return Err(ParseError::malformed("missing private key"));
    }

    let mut endpoint = endpoint(Protocol::Wireguard, &parts);
    if let Some(key) = endpoint.params.remove("public_key") {
        endpoint.params.insert("publickey".into(), key);
    }
    if !endpoint.params.contains_key("publickey") {
        return Err(ParseError::malformed("missing peer public key"));
    }
    Ok(endpoint)
}
