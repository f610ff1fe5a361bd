// Encoding helpers shared by the scheme parsers.

use base64::Engine as _;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use percent_encoding::percent_decode_str;

use crate::error::ParseError;

const ENGINES: [&GeneralPurpose; 4] = [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD];

/// Decode base64 in any of the alphabets/padding styles seen in the wild.
pub(crate) fn base64_to_string(input: &str) -> Result<String, ParseError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(ParseError::malformed("empty base64 payload"));
    }

    for engine in ENGINES {
        if let Ok(bytes) = engine.decode(cleaned.as_bytes()) {
            return String::from_utf8(bytes)
                .map_err(|_| ParseError::malformed("base64 payload is not UTF-8"));
        }
    }

    Err(ParseError::malformed("invalid base64 payload"))
}

/// Percent-decode, replacing invalid UTF-8 rather than failing.
pub(crate) fn percent(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Split `host:port` / `[v6]:port`, ignoring any trailing path.
pub(crate) fn split_host_port(input: &str) -> Result<(String, u16), ParseError> {
    let trimmed = input.trim();
    let host_port = trimmed.split_once('/').map_or(trimmed, |(head, _)| head);

    let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ParseError::malformed("unterminated IPv6 literal"))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| ParseError::malformed("missing port"))?;
        (host, port)
    } else {
        host_port
            .rsplit_once(':')
            .ok_or_else(|| ParseError::malformed("missing port"))?
    };

    if host.is_empty() {
        return Err(ParseError::malformed("missing address"));
    }
    Ok((host.to_owned(), parse_port(port)?))
}

pub(crate) fn parse_port(input: &str) -> Result<u16, ParseError> {
    match input.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ParseError::malformed(format!("invalid port '{input}'"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base64_alphabets() {
        assert_eq!(base64_to_string("aGVsbG8=").unwrap(), "hello");
        assert_eq!(base64_to_string("aGVsbG8").unwrap(), "hello");
        assert_eq!(base64_to_string("aGVs\nbG8=").unwrap(), "hello");
        // 0xfb 0xff encodes to "-_8" in the url-safe alphabet
        assert!(base64_to_string("-_8").is_err());
        assert!(base64_to_string("   ").is_err());
    }

    #[test]
    fn host_port_forms() {
        assert_eq!(split_host_port("a.b:80").unwrap(), ("a.b".into(), 80));
        assert_eq!(split_host_port("[::1]:443/").unwrap(), ("::1".into(), 443));
        assert!(split_host_port("a.b").is_err());
        assert!(split_host_port(":80").is_err());
        assert!(split_host_port("a.b:0").is_err());
        assert!(split_host_port("[::1:443").is_err());
    }
}
