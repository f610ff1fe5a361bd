// ── Legacy catalog format ──
//
// Before profile groups existed the client kept a flat server list under
// `servers` and the subscription URLs under `subscriptions`. Conversion is
// pure; the store decides when to run it and what to delete afterwards.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use super::catalog::Quarantined;
use crate::model::{GroupKind, ProfileGroup, ServerProfile};
use crate::parser;

pub(crate) const LEGACY_SERVERS_KEY: &str = "servers";
pub(crate) const LEGACY_SUBSCRIPTIONS_KEY: &str = "subscriptions";

/// Name of the group that receives manually added legacy servers.
pub(crate) const MANUAL_GROUP_NAME: &str = "My Servers";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyServer {
    raw: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    subscription_url: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Converted {
    pub groups: Vec<ProfileGroup>,
    pub quarantined: Vec<Quarantined>,
}

impl Converted {
    pub(crate) fn server_count(&self) -> usize {
        self.groups.iter().map(|g| g.servers.len()).sum()
    }
}

/// Build profile groups from the legacy keys.
///
/// Manual entries land in one local group; subscription entries are
/// grouped per URL, in first-seen order. A descriptor that no longer
/// parses is quarantined, never dropped.
pub(crate) fn convert(servers_json: Option<&str>, subscriptions_json: Option<&str>) -> Converted {
    let mut out = Converted::default();

    let records: Vec<Value> = match servers_json.map(serde_json::from_str::<Vec<Value>>) {
        None => Vec::new(),
        Some(Ok(records)) => records,
        Some(Err(e)) => {
            out.quarantined.push(Quarantined::new(
                format!("undecodable legacy server list: {e}"),
                Value::String(servers_json.unwrap_or_default().to_owned()),
            ));
            Vec::new()
        }
    };

    let mut manual: Vec<ServerProfile> = Vec::new();
    let mut manual_ids = HashSet::new();
    let mut remote: Vec<(String, Vec<ServerProfile>)> = Vec::new();

    for record in records {
        let legacy: LegacyServer = match serde_json::from_value(record.clone()) {
            Ok(legacy) => legacy,
            Err(e) => {
                out.quarantined
                    .push(Quarantined::new(format!("undecodable legacy server: {e}"), record));
                continue;
            }
        };
        let mut server = match parser::parse(&legacy.raw) {
            Ok(server) => server,
            Err(e) => {
                out.quarantined.push(Quarantined::new(e.to_string(), record));
                continue;
            }
        };
        if let Some(name) = legacy.name.filter(|n| !n.trim().is_empty()) {
            server.name = name;
        }

        match legacy.subscription_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => {
                let slot = slot_for(&mut remote, &url);
                let servers = &mut remote[slot].1;
                if !servers.iter().any(|s| s.id == server.id) {
                    servers.push(server.from_subscription(&url));
                }
            }
            None => {
                if manual_ids.insert(server.id.clone()) {
                    manual.push(server.as_manual());
                }
            }
        }
    }

    if let Some(json) = subscriptions_json {
        match serde_json::from_str::<Vec<String>>(json) {
            Ok(urls) => {
                for url in urls.iter().filter(|u| !u.trim().is_empty()) {
                    slot_for(&mut remote, url);
                }
            }
            Err(e) => out.quarantined.push(Quarantined::new(
                format!("undecodable legacy subscription list: {e}"),
                Value::String(json.to_owned()),
            )),
        }
    }

    if !manual.is_empty() {
        out.groups.push(ProfileGroup::new(
            MANUAL_GROUP_NAME.to_owned(),
            GroupKind::Local,
            manual,
        ));
    }
    for (url, servers) in remote {
        let name = group_name_for_url(&url);
        out.groups
            .push(ProfileGroup::new(name, GroupKind::Remote { url }, servers));
    }
    out
}

/// Index of `url` in first-seen order, appending it if new.
fn slot_for(remote: &mut Vec<(String, Vec<ServerProfile>)>, url: &str) -> usize {
    if let Some(index) = remote.iter().position(|(u, _)| u == url) {
        return index;
    }
    remote.push((url.to_owned(), Vec::new()));
    remote.len() - 1
}

/// Default display name for a subscription: its host, or the URL itself.
pub(crate) fn group_name_for_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}
