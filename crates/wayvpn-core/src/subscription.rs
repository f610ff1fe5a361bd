// ── Subscription synchronizer ──
//
// Fetches a subscription endpoint, unwraps the optional base64 envelope,
// parses every descriptor line, and keeps per-URL refresh bookkeeping.
// Merging results into the catalog is the Profile Store's job.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wayvpn_api::SubscriptionClient;

use crate::config::SubscriptionSettings;
use crate::error::{ParseError, StorageError, SyncError};
use crate::model::{ServerProfile, SubscriptionMeta};
use crate::parser;
use crate::parser::decode::base64_to_string;
use crate::ports::SecureStore;

/// Storage key of the URL -> `SubscriptionMeta` map.
pub const META_KEY: &str = "subscription_meta";

/// Subscriptions older than this are due for a refresh.
pub const STALE_AFTER_HOURS: i64 = 24;

/// One rejected line of a subscription body (1-based line number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub line: usize,
    pub error: ParseError,
}

/// A fetch that produced at least one server.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub servers: Vec<ServerProfile>,
    pub errors: Vec<LineError>,
}

pub struct SubscriptionSync {
    client: SubscriptionClient,
    storage: Arc<dyn SecureStore>,
    meta_lock: Mutex<()>,
}

impl SubscriptionSync {
    pub fn new(client: SubscriptionClient, storage: Arc<dyn SecureStore>) -> Self {
        Self {
            client,
            storage,
            meta_lock: Mutex::new(()),
        }
    }

    /// Build the HTTP client from settings.
    pub fn from_settings(
        settings: &SubscriptionSettings,
        storage: Arc<dyn SecureStore>,
    ) -> Result<Self, SyncError> {
        let client = SubscriptionClient::new(&settings.transport())?;
        Ok(Self::new(client, storage))
    }

    /// Fetch `url` and parse every descriptor in the body.
    pub async fn fetch_and_parse(&self, url: &str) -> Result<SyncOutcome, SyncError> {
        let body = self.client.fetch(url).await?;
        let outcome = parse_body(&body, url)?;
        info!(
            url,
            servers = outcome.servers.len(),
            rejected = outcome.errors.len(),
            "subscription parsed"
        );
        Ok(outcome)
    }

    /// Whether `url` is due for a refresh right now.
    pub async fn should_refresh(&self, url: &str) -> bool {
        self.should_refresh_at(url, Utc::now()).await
    }

    pub async fn should_refresh_at(&self, url: &str, now: DateTime<Utc>) -> bool {
        match self.load_meta().await {
            Ok(meta) => is_stale(meta.get(url), now),
            Err(e) => {
                warn!(url, error = %e, "subscription metadata unreadable, treating as stale");
                true
            }
        }
    }

    /// Record a successful refresh of `url` at `at`.
    ///
    /// Read-modify-write on the shared metadata map, serialized against
    /// every other writer in this process.
    pub async fn mark_refreshed(&self, url: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        let _guard = self.meta_lock.lock().await;
        let mut meta = self.load_meta().await?;
        meta.insert(url.to_owned(), SubscriptionMeta { last_refresh: at });
        let json = serde_json::to_string(&meta).map_err(|e| StorageError::Io(e.to_string()))?;
        self.storage.write(META_KEY, &json).await?;
        debug!(url, "subscription refresh recorded");
        Ok(())
    }

    /// Snapshot of all refresh bookkeeping.
    pub async fn meta(&self) -> Result<BTreeMap<String, SubscriptionMeta>, StorageError> {
        self.load_meta().await
    }

    async fn load_meta(&self) -> Result<BTreeMap<String, SubscriptionMeta>, StorageError> {
        let Some(json) = self.storage.read(META_KEY).await? else {
            return Ok(BTreeMap::new());
        };
        Ok(serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, "discarding undecodable subscription metadata");
            BTreeMap::new()
        }))
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────

/// Staleness rule: no metadata, or last refresh at least 24 hours ago.
pub fn is_stale(meta: Option<&SubscriptionMeta>, now: DateTime<Utc>) -> bool {
    meta.is_none_or(|m| now - m.last_refresh >= TimeDelta::hours(STALE_AFTER_HOURS))
}

/// A body with no `://` anywhere is assumed to be base64-wrapped.
pub fn decode_envelope(body: &str) -> Cow<'_, str> {
    let trimmed = body.trim();
    if trimmed.contains("://") {
        return Cow::Borrowed(body);
    }
    match base64_to_string(trimmed) {
        Ok(decoded) => Cow::Owned(decoded),
        Err(_) => Cow::Borrowed(body),
    }
}

/// Parse every descriptor line of a (possibly wrapped) subscription body.
///
/// Successes are tagged with `url`; duplicates within the body keep the
/// first occurrence. Zero successes is a hard failure.
pub fn parse_body(body: &str, url: &str) -> Result<SyncOutcome, SyncError> {
    let decoded = decode_envelope(body);
    if decoded.trim().is_empty() {
        return Err(SyncError::EmptyBody);
    }

    let mut seen = HashSet::new();
    let mut servers = Vec::new();
    let mut errors = Vec::new();

    for (index, line) in decoded.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        match parser::parse(line) {
            Ok(profile) => {
                if seen.insert(profile.id.clone()) {
                    servers.push(profile.from_subscription(url));
                }
            }
            Err(error) => {
                debug!(line = index + 1, %error, "rejected subscription line");
                errors.push(LineError {
                    line: index + 1,
                    error,
                });
            }
        }
    }

    if servers.is_empty() {
        return Err(SyncError::NoValidEntries {
            rejected: errors.len(),
        });
    }
    Ok(SyncOutcome { servers, errors })
}
