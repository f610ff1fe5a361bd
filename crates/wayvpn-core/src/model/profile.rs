// ── Server profile ──

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Tunnel protocol carried by a descriptor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
    Shadowsocks,
    Wireguard,
}

/// Where a server entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Manual,
    Subscription,
}

/// One connectable endpoint parsed from a descriptor URI.
///
/// `id` is derived from `raw`, so the same descriptor always maps to the
/// same entry no matter how many times it is imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProfile {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tested: Option<DateTime<Utc>>,
    /// The trimmed descriptor, handed verbatim to the tunnel engine.
    pub raw: String,
    /// Transport settings from the descriptor (never credentials).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl ServerProfile {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Tag this entry as owned by a subscription.
    pub fn from_subscription(mut self, url: &str) -> Self {
        self.source = Source::Subscription;
        self.subscription_url = Some(url.to_owned());
        self
    }

    /// Tag this entry as manually curated.
    pub fn as_manual(mut self) -> Self {
        self.source = Source::Manual;
        self.subscription_url = None;
        self
    }

    /// Copy mutable metadata from a fresher record of the same descriptor.
    ///
    /// Identity and provenance stay untouched; health only moves forward.
    pub(crate) fn refresh_metadata_from(&mut self, fresher: &ServerProfile) {
        self.name.clone_from(&fresher.name);
        self.params.clone_from(&fresher.params);
        if fresher.last_tested.is_some() {
            self.reachable = fresher.reachable;
            self.last_tested = fresher.last_tested;
        }
    }
}

impl fmt::Display for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.protocol, self.endpoint())
    }
}
