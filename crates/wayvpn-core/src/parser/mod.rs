// ── Descriptor parser ──
//
// Turns one `scheme://...` line into a `ServerProfile`. Pure: no I/O and
// no shared state, so every rule here is testable against literal strings.

pub(crate) mod decode;
mod shadowsocks;
mod uri;
mod vmess;

use std::collections::BTreeMap;

use crate::error::ParseError;
use crate::model::{Protocol, ServerProfile, Source};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Query keys that carry credentials. They stay in `raw` only.
const SECRET_PARAMS: &[&str] = &[
    "id",
    "uuid",
    "password",
    "privatekey",
    "private_key",
    "presharedkey",
    "psk",
];

/// Fields extracted by a scheme parser before identity is attached.
#[derive(Debug)]
struct Endpoint {
    protocol: Protocol,
    address: String,
    port: u16,
    name: Option<String>,
    params: BTreeMap<String, String>,
}

impl Endpoint {
    fn new(protocol: Protocol, address: String, port: u16) -> Self {
        Self {
            protocol,
            address,
            port,
            name: None,
            params: BTreeMap::new(),
        }
    }

    fn param(&mut self, key: &str, value: &str) {
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key.is_empty() || value.is_empty() || SECRET_PARAMS.contains(&key.as_str()) {
            return;
        }
        self.params.insert(key, value.to_owned());
    }

    fn into_profile(self, raw: &str) -> ServerProfile {
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{}-{}:{}", self.protocol, self.address, self.port));

        ServerProfile {
            id: profile_id(raw),
            name,
            address: self.address,
            port: self.port,
            protocol: self.protocol,
            source: Source::Manual,
            subscription_url: None,
            reachable: None,
            last_tested: None,
            raw: raw.to_owned(),
            params: self.params,
        }
    }
}

/// Parse a single descriptor URI.
///
/// Leading and trailing whitespace is ignored; the trimmed text becomes
/// both the profile's `raw` field and the input to its id.
pub fn parse(raw: &str) -> Result<ServerProfile, ParseError> {
    let raw = raw.trim();
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| ParseError::malformed("missing scheme separator"))?;

    let endpoint = match scheme.to_ascii_lowercase().as_str() {
        "vless" => uri::parse_vless(raw)?,
        "trojan" => uri::parse_trojan(raw)?,
        "wireguard" | "wg" => uri::parse_wireguard(raw)?,
        "vmess" => vmess::parse(rest)?,
        "ss" => shadowsocks::parse(rest)?,
        other => return Err(ParseError::UnsupportedScheme(other.to_owned())),
    };

    Ok(endpoint.into_profile(raw))
}

/// Content-derived profile id: 64-bit FNV-1a of the trimmed descriptor,
/// rendered as 16 lowercase hex digits.
pub fn profile_id(raw: &str) -> String {
    format!("{:016x}", fnv1a64(raw.trim().as_bytes()))
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use pretty_assertions::assert_eq;

    use super::*;

    const VLESS: &str =
        "vless://b831381d-6324-4d53-ad4f-8cda48b30811@203.0.113.1:443?encryption=none&security=tls&type=ws#MyServer";

    #[test]
    fn parses_vless_descriptor() {
        let profile = parse(VLESS).unwrap();
        assert_eq!(profile.protocol, Protocol::Vless);
        assert_eq!(profile.address, "203.0.113.1");
        assert_eq!(profile.port, 443);
        assert_eq!(profile.name, "MyServer");
        assert_eq!(profile.source, Source::Manual);
        assert_eq!(profile.params.get("security").map(String::as_str), Some("tls"));
        assert_eq!(profile.params.get("type").map(String::as_str), Some("ws"));
        assert_eq!(profile.raw, VLESS);
    }

    #[test]
    fn id_is_deterministic_hex() {
        let inputs = [
            VLESS,
            "trojan://secret@example.com:443#A",
            "ss://YWVzLTI1Ni1nY206cGFzcw@198.51.100.7:8388",
        ];
        for input in inputs {
            let a = parse(input).unwrap();
            let b = parse(input).unwrap();
            assert_eq!(a.id, b.id);
            assert_eq!(a.id.len(), 16);
            assert!(a.id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn fnv_reference_vectors() {
        assert_eq!(profile_id(""), "cbf29ce484222325");
        assert_eq!(profile_id("a"), "af63dc4c8601ec8c");
        assert_eq!(profile_id("foobar"), "85944171f73967e8");
    }

    #[test]
    fn surrounding_whitespace_does_not_change_identity() {
        let padded = format!("  {VLESS}\r\n");
        assert_eq!(parse(&padded).unwrap().id, parse(VLESS).unwrap().id);
    }

    #[test]
    fn distinct_descriptors_get_distinct_ids() {
        let a = parse("trojan://secret@example.com:443#A").unwrap();
        let b = parse("trojan://secret@example.com:443#B").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn unknown_scheme_is_unsupported() {
        assert_eq!(
            parse("https://example.com/sub").unwrap_err(),
            ParseError::UnsupportedScheme("https".into())
        );
        assert_eq!(
            parse("HYSTERIA2://pw@host:443").unwrap_err(),
            ParseError::UnsupportedScheme("hysteria2".into())
        );
    }

    #[test]
    fn missing_scheme_is_malformed() {
        assert!(matches!(parse("just some text"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse(""), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn vless_requires_port_and_user() {
        assert!(matches!(
            parse("vless://uuid@203.0.113.1#NoPort"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse("vless://203.0.113.1:443"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse("vless://uuid@203.0.113.1:99999"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn name_falls_back_to_endpoint() {
        let profile = parse("trojan://secret@example.com:8443").unwrap();
        assert_eq!(profile.name, "trojan-example.com:8443");
    }

    #[test]
    fn trojan_ipv6_and_credentials_stay_out_of_params() {
        let profile =
            parse("trojan://hunter2@[2001:db8::1]:443?sni=example.com&password=leak#Edge%20Node")
                .unwrap();
        assert_eq!(profile.protocol, Protocol::Trojan);
        assert_eq!(profile.address, "2001:db8::1");
        assert_eq!(profile.endpoint(), "[2001:db8::1]:443");
        assert_eq!(profile.name, "Edge Node");
        assert_eq!(profile.params.get("sni").map(String::as_str), Some("example.com"));
        assert!(!profile.params.contains_key("password"));
        assert!(profile.params.values().all(|v| v != "hunter2"));
    }

    #[test]
    fn parses_vmess_json_payload() {
        let doc = r#"{"v":"2","ps":"Frankfurt","add":"vm.example.net","port":"8443","id":"0d6b1f6e-7c8b-4c4f-9a49-0f9e0b3a1c2d","aid":0,"net":"ws","path":"/ray","tls":"tls"}"#;
        let raw = format!("vmess://{}", STANDARD.encode(doc));

        let profile = parse(&raw).unwrap();
        assert_eq!(profile.protocol, Protocol::Vmess);
        assert_eq!(profile.address, "vm.example.net");
        assert_eq!(profile.port, 8443);
        assert_eq!(profile.name, "Frankfurt");
        assert_eq!(profile.params.get("net").map(String::as_str), Some("ws"));
        assert_eq!(profile.params.get("aid").map(String::as_str), Some("0"));
        assert!(!profile.params.contains_key("id"));
    }

    #[test]
    fn vmess_accepts_numeric_port_and_unpadded_base64() {
        let doc = r#"{"add":"10.1.2.3","port":443,"id":"abc","ps":""}"#;
        let raw = format!("vmess://{}", URL_SAFE_NO_PAD.encode(doc));

        let profile = parse(&raw).unwrap();
        assert_eq!(profile.port, 443);
        assert_eq!(profile.name, "vmess-10.1.2.3:443");
    }

    #[test]
    fn vmess_rejects_bad_payloads() {
        assert!(matches!(parse("vmess://%%%not-base64"), Err(ParseError::Malformed(_))));

        let missing_addr = format!("vmess://{}", STANDARD.encode(r#"{"port":"443","id":"x"}"#));
        assert!(matches!(parse(&missing_addr), Err(ParseError::Malformed(_))));

        let not_json = format!("vmess://{}", STANDARD.encode("hello"));
        assert!(matches!(parse(&not_json), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn parses_sip002_shadowsocks() {
        let userinfo = URL_SAFE_NO_PAD.encode("aes-256-gcm:s3cret");
        let raw = format!("ss://{userinfo}@198.51.100.7:8388/?plugin=obfs-local#Tokyo%201");

        let profile = parse(&raw).unwrap();
        assert_eq!(profile.protocol, Protocol::Shadowsocks);
        assert_eq!(profile.address, "198.51.100.7");
        assert_eq!(profile.port, 8388);
        assert_eq!(profile.name, "Tokyo 1");
        assert_eq!(profile.params.get("method").map(String::as_str), Some("aes-256-gcm"));
        assert_eq!(profile.params.get("plugin").map(String::as_str), Some("obfs-local"));
    }

    #[test]
    fn parses_plain_userinfo_shadowsocks() {
        let profile = parse("ss://2022-blake3-aes-128-gcm:a%2Bb@[2001:db8::7]:443").unwrap();
        assert_eq!(profile.address, "2001:db8::7");
        assert_eq!(profile.port, 443);
        assert_eq!(
            profile.params.get("method").map(String::as_str),
            Some("2022-blake3-aes-128-gcm")
        );
    }

    #[test]
    fn parses_legacy_shadowsocks() {
        let raw = format!(
            "ss://{}",
            STANDARD.encode("chacha20-ietf-poly1305:pw@example.com:8443")
        );
        let profile = parse(&raw).unwrap();
        assert_eq!(profile.address, "example.com");
        assert_eq!(profile.port, 8443);
        assert_eq!(profile.name, "shadowsocks-example.com:8443");
    }

    #[test]
    fn shadowsocks_without_password_is_malformed() {
        let raw = format!("ss://{}@1.2.3.4:8388", STANDARD.encode("aes-256-gcm"));
        assert!(matches!(parse(&raw), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn parses_wireguard() {
        let profile = parse(
            "wireguard://cHJpdmF0ZQ@203.0.113.9:51820?publickey=UHVibGlj&address=10.0.0.2%2F32#Home",
        )
        .unwrap();
        assert_eq!(profile.protocol, Protocol::Wireguard);
        assert_eq!(profile.port, 51820);
        assert_eq!(profile.name, "Home");
        assert_eq!(profile.params.get("publickey").map(String::as_str), Some("UHVibGlj"));
        assert_eq!(profile.params.get("address").map(String::as_str), Some("10.0.0.2/32"));
    }

    #[test]
    fn wireguard_requires_peer_key() {
        assert!(matches!(
            parse("wg://cHJpdmF0ZQ@203.0.113.9:51820#Home"),
            Err(ParseError::Malformed(_))
        ));
    }
}
