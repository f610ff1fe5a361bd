// ── Profile groups ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ServerProfile;

/// Opaque group identifier (a v4 UUID rendered as a string).
pub type GroupId = String;

/// Whether a group is curated by hand or owned by a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GroupKind {
    Local,
    Remote { url: String },
}

/// A named, activatable collection of servers.
///
/// Remote groups have their server list replaced wholesale on every
/// successful refresh; the group id survives the replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileGroup {
    pub id: GroupId,
    pub name: String,
    pub kind: GroupKind,
    #[serde(default)]
    pub servers: Vec<ServerProfile>,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileGroup {
    pub(crate) fn new(name: String, kind: GroupKind, servers: Vec<ServerProfile>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            kind,
            servers,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The subscription URL backing this group, if it is remote.
    pub fn subscription_url(&self) -> Option<&str> {
        match &self.kind {
            GroupKind::Remote { url } => Some(url),
            GroupKind::Local => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, GroupKind::Remote { .. })
    }

    pub fn server(&self, server_id: &str) -> Option<&ServerProfile> {
        self.servers.iter().find(|s| s.id == server_id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Per-subscription-URL refresh bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMeta {
    pub last_refresh: DateTime<Utc>,
}
