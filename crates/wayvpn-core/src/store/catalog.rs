// ── Catalog document ──
//
// The persisted catalog is one JSON document under `catalog`. Loading
// validates every group and server individually; anything that fails is
// moved aside into `catalog.quarantine` instead of failing the load.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;
use crate::model::{GroupKind, ProfileGroup};
use crate::parser;

pub(crate) const CATALOG_KEY: &str = "catalog";
pub(crate) const QUARANTINE_KEY: &str = "catalog.quarantine";
pub(crate) const CATALOG_VERSION: u32 = 2;

#[derive(Serialize)]
struct Document<'a> {
    version: u32,
    groups: &'a [ProfileGroup],
}

#[derive(Deserialize)]
struct RawDocument {
    version: u32,
    #[serde(default)]
    groups: Vec<Value>,
}

/// A record that could not be loaded, kept for manual recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quarantined {
    pub reason: String,
    pub record: Value,
}

impl Quarantined {
    pub(crate) fn new(reason: impl Into<String>, record: Value) -> Self {
        Self {
            reason: reason.into(),
            record,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Loaded {
    pub groups: Vec<ProfileGroup>,
    pub quarantined: Vec<Quarantined>,
}

pub(crate) fn encode(groups: &[ProfileGroup]) -> Result<String, StoreError> {
    serde_json::to_string(&Document {
        version: CATALOG_VERSION,
        groups,
    })
    .map_err(|e| StoreError::Validation(format!("catalog encode: {e}")))
}

/// Decode and validate a stored catalog document.
///
/// Never fails: an unreadable document is quarantined whole and the
/// catalog starts empty.
pub(crate) fn decode(json: &str) -> Loaded {
    let raw: RawDocument = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            return whole_document(format!("undecodable catalog: {e}"), json);
        }
    };
    if raw.version != CATALOG_VERSION {
        return whole_document(format!("unsupported catalog version {}", raw.version), json);
    }

    let mut loaded = Loaded::default();
    let mut group_ids = HashSet::new();
    for record in raw.groups {
        let mut group: ProfileGroup = match serde_json::from_value(record.clone()) {
            Ok(group) => group,
            Err(e) => {
                loaded
                    .quarantined
                    .push(Quarantined::new(format!("undecodable group: {e}"), record));
                continue;
            }
        };
        if let Err(reason) = validate_group(&group) {
            loaded.quarantined.push(Quarantined::new(reason, record));
            continue;
        }
        if !group_ids.insert(group.id.clone()) {
            loaded
                .quarantined
                .push(Quarantined::new(format!("duplicate group id {}", group.id), record));
            continue;
        }
        loaded.quarantined.extend(retain_valid_servers(&mut group));
        loaded.groups.push(group);
    }

    if !loaded.quarantined.is_empty() {
        warn!(count = loaded.quarantined.len(), "quarantined catalog records");
    }
    loaded
}

fn whole_document(reason: String, json: &str) -> Loaded {
    warn!(%reason, "quarantining catalog document");
    Loaded {
        groups: Vec::new(),
        quarantined: vec![Quarantined::new(reason, Value::String(json.to_owned()))],
    }
}

fn validate_group(group: &ProfileGroup) -> Result<(), String> {
    if group.id.trim().is_empty() {
        return Err("group without id".into());
    }
    if group.name.trim().is_empty() {
        return Err(format!("group {} has an empty name", group.id));
    }
    if let GroupKind::Remote { url } = &group.kind {
        if url.trim().is_empty() {
            return Err(format!("remote group {} has no subscription URL", group.id));
        }
    }
    Ok(())
}

/// Drop servers whose id does not match their descriptor, plus in-group
/// duplicates. Returns the dropped records that are worth keeping.
fn retain_valid_servers(group: &mut ProfileGroup) -> Vec<Quarantined> {
    let mut quarantined = Vec::new();
    let mut seen = HashSet::new();
    let group_id = group.id.clone();
    group.servers.retain(|server| {
        if server.id != parser::profile_id(&server.raw) {
            quarantined.push(Quarantined::new(
                format!("server id does not match descriptor in group {group_id}"),
                serde_json::to_value(server).unwrap_or(Value::Null),
            ));
            return false;
        }
        seen.insert(server.id.clone())
    });
    quarantined
}
