// ── Profile store ──
//
// Durable catalog of profile groups. Every mutation builds the next
// catalog from the current snapshot, persists it as one document, and only
// then publishes it, all under a single write lock. Readers never block.

mod catalog;
mod collection;
mod legacy;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{GroupId, GroupKind, ProfileGroup, ServerProfile};
use crate::parser;
use crate::ports::SecureStore;
use crate::stream::Watched;
use crate::subscription::SubscriptionSync;

pub use catalog::Quarantined;

use catalog::{CATALOG_KEY, QUARANTINE_KEY};
use collection::{CatalogCollection, GroupSnapshot};
use legacy::{LEGACY_SERVERS_KEY, LEGACY_SUBSCRIPTIONS_KEY};

// ── Reports ──────────────────────────────────────────────────────────

/// Result of importing descriptors into a local group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// New catalog entries.
    pub added: usize,
    /// Already present somewhere; metadata refreshed in place.
    pub refreshed: usize,
}

/// Result of a legacy-format migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `false` when there was nothing to migrate or it already happened.
    pub migrated: bool,
    pub groups: usize,
    pub servers: usize,
    pub quarantined: usize,
}

/// Result of a background staleness sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub refreshed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
}

// ── Store handle ─────────────────────────────────────────────────────

/// Cheaply cloneable handle to the catalog.
#[derive(Clone)]
pub struct ProfileStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    storage: Arc<dyn SecureStore>,
    sync: SubscriptionSync,
    catalog: CatalogCollection,
    write_lock: Mutex<()>,
}

impl ProfileStore {
    /// Load the persisted catalog, migrating the legacy format first if
    /// that has not happened yet.
    pub async fn open(
        storage: Arc<dyn SecureStore>,
        sync: SubscriptionSync,
    ) -> Result<Self, StoreError> {
        let store = Self {
            inner: Arc::new(StoreInner {
                storage,
                sync,
                catalog: CatalogCollection::new(),
                write_lock: Mutex::new(()),
            }),
        };
        store.load().await?;
        let report = store.migrate_from_legacy().await?;
        if report.migrated {
            info!(
                groups = report.groups,
                servers = report.servers,
                "legacy catalog migrated"
            );
        }
        debug!(groups = store.inner.catalog.len(), "profile store opened");
        Ok(store)
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Every group, in display order.
    pub fn groups(&self) -> GroupSnapshot {
        self.inner.catalog.snapshot()
    }

    pub fn active(&self) -> Option<Arc<ProfileGroup>> {
        self.inner.catalog.active()
    }

    pub fn get(&self, group_id: &str) -> Option<Arc<ProfileGroup>> {
        self.inner.catalog.get(group_id)
    }

    pub fn find_server(&self, server_id: &str) -> Option<ServerProfile> {
        self.inner
            .catalog
            .find_server(server_id)
            .map(|(_, server)| server)
    }

    pub fn watch_all(&self) -> Watched<GroupSnapshot> {
        Watched::new(self.inner.catalog.subscribe())
    }

    pub fn watch_active(&self) -> Watched<Option<Arc<ProfileGroup>>> {
        Watched::new(self.inner.catalog.subscribe_active())
    }

    /// The synchronizer backing remote groups.
    pub fn subscriptions(&self) -> &SubscriptionSync {
        &self.inner.sync
    }

    /// Records set aside because they failed validation.
    pub async fn quarantined(&self) -> Result<Vec<Quarantined>, StoreError> {
        Ok(self.read_quarantine().await?)
    }

    // ── Group lifecycle ──────────────────────────────────────────────

    /// Create a hand-curated group. The first group ever created becomes
    /// active.
    pub async fn add_local(
        &self,
        name: &str,
        servers: Vec<ServerProfile>,
    ) -> Result<Arc<ProfileGroup>, StoreError> {
        let name = validate_name(name)?;
        let mut seen = HashSet::new();
        let servers: Vec<ServerProfile> = servers
            .into_iter()
            .filter(|s| seen.insert(s.id.clone()))
            .map(ServerProfile::as_manual)
            .collect();

        let id = self
            .mutate(|groups| {
                let group = ProfileGroup::new(name, GroupKind::Local, servers);
                let id = group.id.clone();
                groups.push(group);
                Ok(id)
            })
            .await?;
        info!(group = %id, "local group created");
        self.require(&id)
    }

    /// Create a subscription-backed group. The initial fetch must succeed
    /// before anything is stored. Adding a URL that already has a group
    /// refreshes that group instead.
    pub async fn add_remote(
        &self,
        url: &str,
        name: Option<&str>,
    ) -> Result<Arc<ProfileGroup>, StoreError> {
        let url = url.trim();
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let outcome = self.inner.sync.fetch_and_parse(url).await?;

        let id = self
            .mutate(|groups| {
                if let Some(group) = groups
                    .iter_mut()
                    .find(|g| g.subscription_url() == Some(url))
                {
                    replace_servers(group, outcome.servers);
                    if let Some(name) = name {
                        name.clone_into(&mut group.name);
                    }
                    return Ok(group.id.clone());
                }
                let name = name.map_or_else(|| legacy::group_name_for_url(url), str::to_owned);
                let group = ProfileGroup::new(
                    name,
                    GroupKind::Remote {
                        url: url.to_owned(),
                    },
                    outcome.servers,
                );
                let id = group.id.clone();
                groups.push(group);
                Ok(id)
            })
            .await?;
        self.record_refresh(url).await;
        info!(group = %id, url, "remote group stored");
        self.require(&id)
    }

    /// Delete a group. Deleting the active group activates the first
    /// remaining one.
    pub async fn delete(&self, group_id: &str) -> Result<(), StoreError> {
        self.mutate(|groups| {
            let index = position(groups, group_id)?;
            groups.remove(index);
            Ok(())
        })
        .await?;
        info!(group = group_id, "group deleted");
        Ok(())
    }

    /// Make `group_id` the only active group. Activating the already
    /// active group is a no-op.
    pub async fn set_active(&self, group_id: &str) -> Result<Arc<ProfileGroup>, StoreError> {
        if let Some(active) = self.active().filter(|g| g.id == group_id) {
            return Ok(active);
        }
        self.mutate(|groups| {
            position(groups, group_id)?;
            for group in groups.iter_mut() {
                group.is_active = group.id == group_id;
            }
            Ok(())
        })
        .await?;
        info!(group = group_id, "group activated");
        self.require(group_id)
    }

    pub async fn rename(&self, group_id: &str, name: &str) -> Result<Arc<ProfileGroup>, StoreError> {
        let name = validate_name(name)?;
        self.mutate(|groups| {
            let index = position(groups, group_id)?;
            groups[index].name = name;
            groups[index].touch();
            Ok(())
        })
        .await?;
        self.require(group_id)
    }

    /// Reorder groups. `ordered` must name every group exactly once.
    pub async fn reorder(&self, ordered: &[GroupId]) -> Result<(), StoreError> {
        self.mutate(|groups| {
            let current: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
            check_permutation(&current, ordered, "group")?;
            groups.sort_by_key(|g| ordered.iter().position(|id| *id == g.id));
            Ok(())
        })
        .await
    }

    /// Reorder the servers of a local group.
    pub async fn reorder_servers(&self, group_id: &str, ordered: &[String]) -> Result<(), StoreError> {
        self.mutate(|groups| {
            let index = local_position(groups, group_id)?;
            let group = &mut groups[index];
            let current: Vec<&str> = group.servers.iter().map(|s| s.id.as_str()).collect();
            check_permutation(&current, ordered, "server")?;
            group
                .servers
                .sort_by_key(|s| ordered.iter().position(|id| *id == s.id));
            group.touch();
            Ok(())
        })
        .await
    }

    // ── Servers ──────────────────────────────────────────────────────

    /// Import one descriptor into a local group.
    ///
    /// A descriptor already present anywhere in the catalog is not added
    /// again; its metadata is refreshed in place.
    pub async fn import(&self, group_id: &str, raw: &str) -> Result<ImportReport, StoreError> {
        let server = parser::parse(raw)?;
        self.add_servers(group_id, vec![server]).await
    }

    /// Import already-parsed servers into a local group.
    pub async fn add_servers(
        &self,
        group_id: &str,
        servers: Vec<ServerProfile>,
    ) -> Result<ImportReport, StoreError> {
        let report = self
            .mutate(|groups| {
                let index = local_position(groups, group_id)?;
                let mut report = ImportReport::default();
                for server in servers {
                    let mut present = false;
                    for existing in groups
                        .iter_mut()
                        .flat_map(|g| g.servers.iter_mut())
                        .filter(|s| s.id == server.id)
                    {
                        existing.refresh_metadata_from(&server);
                        present = true;
                    }
                    if present {
                        report.refreshed += 1;
                    } else {
                        groups[index].servers.push(server.as_manual());
                        report.added += 1;
                    }
                }
                groups[index].touch();
                Ok(report)
            })
            .await?;
        debug!(group = group_id, added = report.added, refreshed = report.refreshed, "servers imported");
        Ok(report)
    }

    /// Remove one server from a local group.
    pub async fn remove_server(&self, group_id: &str, server_id: &str) -> Result<(), StoreError> {
        self.mutate(|groups| {
            let index = local_position(groups, group_id)?;
            let group = &mut groups[index];
            let before = group.servers.len();
            group.servers.retain(|s| s.id != server_id);
            if group.servers.len() == before {
                return Err(StoreError::server_not_found(server_id));
            }
            group.touch();
            Ok(())
        })
        .await
    }

    /// Record a reachability probe for every catalog entry of `server_id`.
    pub async fn record_health(
        &self,
        server_id: &str,
        reachable: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mutate(|groups| {
            let mut found = false;
            for server in groups
                .iter_mut()
                .flat_map(|g| g.servers.iter_mut())
                .filter(|s| s.id == server_id)
            {
                server.reachable = Some(reachable);
                server.last_tested = Some(at);
                found = true;
            }
            if found {
                Ok(())
            } else {
                Err(StoreError::server_not_found(server_id))
            }
        })
        .await
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Re-fetch `url` and replace its group's servers wholesale.
    pub async fn refresh_subscription(&self, url: &str) -> Result<Arc<ProfileGroup>, StoreError> {
        let url = url.trim();
        if !self.groups().iter().any(|g| g.subscription_url() == Some(url)) {
            return Err(subscription_not_found(url));
        }
        let outcome = self.inner.sync.fetch_and_parse(url).await?;

        let id = self
            .mutate(|groups| {
                let group = groups
                    .iter_mut()
                    .find(|g| g.subscription_url() == Some(url))
                    .ok_or_else(|| subscription_not_found(url))?;
                replace_servers(group, outcome.servers);
                Ok(group.id.clone())
            })
            .await?;
        self.record_refresh(url).await;
        info!(url, "subscription refreshed");
        self.require(&id)
    }

    /// Refresh every subscription that is due. Individual failures are
    /// logged and left for the next cycle.
    pub async fn refresh_stale_subscriptions(&self) -> SweepReport {
        let mut urls: Vec<String> = Vec::new();
        for group in self.groups().iter() {
            if let Some(url) = group.subscription_url() {
                if !urls.iter().any(|u| u == url) {
                    urls.push(url.to_owned());
                }
            }
        }

        let mut report = SweepReport::default();
        for url in urls {
            if !self.inner.sync.should_refresh(&url).await {
                report.skipped.push(url);
                continue;
            }
            match self.refresh_subscription(&url).await {
                Ok(_) => report.refreshed.push(url),
                Err(e) => {
                    warn!(url = %url, error = %e, "subscription sweep failed, retrying next cycle");
                    report.failed.push((url, e));
                }
            }
        }
        debug!(
            refreshed = report.refreshed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "subscription sweep finished"
        );
        report
    }

    // ── Migration ────────────────────────────────────────────────────

    /// Convert the legacy single-list format into profile groups.
    ///
    /// Safe to call on every start: skipped once a catalog document exists
    /// or when there is nothing to convert.
    pub async fn migrate_from_legacy(&self) -> Result<MigrationReport, StoreError> {
        let _guard = self.inner.write_lock.lock().await;
        let storage = &self.inner.storage;

        if storage.read(CATALOG_KEY).await?.is_some() {
            return Ok(MigrationReport::default());
        }
        let servers = storage.read(LEGACY_SERVERS_KEY).await?;
        let subscriptions = storage.read(LEGACY_SUBSCRIPTIONS_KEY).await?;
        if servers.is_none() && subscriptions.is_none() {
            return Ok(MigrationReport::default());
        }

        let converted = legacy::convert(servers.as_deref(), subscriptions.as_deref());
        let report = MigrationReport {
            migrated: true,
            groups: converted.groups.len(),
            servers: converted.server_count(),
            quarantined: converted.quarantined.len(),
        };

        let mut groups = self.inner.catalog.to_vec();
        groups.extend(converted.groups);
        normalize_active(&mut groups);
        self.persist(&groups).await?;
        self.inner.catalog.replace(groups);
        let _ = self.quarantine(converted.quarantined).await;

        for key in [LEGACY_SERVERS_KEY, LEGACY_SUBSCRIPTIONS_KEY] {
            if let Err(e) = storage.delete(key).await {
                warn!(key, error = %e, "failed to remove legacy key (non-fatal)");
            }
        }
        Ok(report)
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn load(&self) -> Result<(), StoreError> {
        let _guard = self.inner.write_lock.lock().await;
        let Some(json) = self.inner.storage.read(CATALOG_KEY).await? else {
            return Ok(());
        };
        let loaded = catalog::decode(&json);
        let mut groups = loaded.groups;
        normalize_active(&mut groups);
        // Rewrite without the bad records so the next open does not
        // quarantine them again.
        if !loaded.quarantined.is_empty() && self.quarantine(loaded.quarantined).await {
            if let Err(e) = self.persist(&groups).await {
                warn!(error = %e, "failed to rewrite cleaned catalog (non-fatal)");
            }
        }
        self.inner.catalog.replace(groups);
        Ok(())
    }

    /// Build, persist and publish the next catalog.
    async fn mutate<R>(
        &self,
        apply: impl FnOnce(&mut Vec<ProfileGroup>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _guard = self.inner.write_lock.lock().await;
        let mut groups = self.inner.catalog.to_vec();
        let out = apply(&mut groups)?;
        normalize_active(&mut groups);
        self.persist(&groups).await?;
        self.inner.catalog.replace(groups);
        Ok(out)
    }

    async fn persist(&self, groups: &[ProfileGroup]) -> Result<(), StoreError> {
        let json = catalog::encode(groups)?;
        self.inner.storage.write(CATALOG_KEY, &json).await?;
        Ok(())
    }

    fn require(&self, group_id: &str) -> Result<Arc<ProfileGroup>, StoreError> {
        self.get(group_id)
            .ok_or_else(|| StoreError::group_not_found(group_id))
    }

    async fn record_refresh(&self, url: &str) {
        if let Err(e) = self.inner.sync.mark_refreshed(url, Utc::now()).await {
            warn!(url, error = %e, "failed to record subscription refresh (non-fatal)");
        }
    }

    async fn read_quarantine(&self) -> Result<Vec<Quarantined>, crate::error::StorageError> {
        let Some(json) = self.inner.storage.read(QUARANTINE_KEY).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&json).unwrap_or_else(|e| {
            vec![Quarantined::new(
                format!("undecodable quarantine: {e}"),
                serde_json::Value::String(json),
            )]
        }))
    }

    /// Append records to the quarantine. Best-effort; returns whether the
    /// records are now stored.
    async fn quarantine(&self, records: Vec<Quarantined>) -> bool {
        if records.is_empty() {
            return true;
        }
        let result = async {
            let mut all = self.read_quarantine().await?;
            all.extend(records);
            let json = serde_json::to_string(&all)
                .map_err(|e| crate::error::StorageError::Io(e.to_string()))?;
            self.inner.storage.write(QUARANTINE_KEY, &json).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to write catalog quarantine (non-fatal)");
                false
            }
        }
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────

fn validate_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("group name must not be empty".into()));
    }
    Ok(name.to_owned())
}

fn position(groups: &[ProfileGroup], group_id: &str) -> Result<usize, StoreError> {
    groups
        .iter()
        .position(|g| g.id == group_id)
        .ok_or_else(|| StoreError::group_not_found(group_id))
}

fn local_position(groups: &[ProfileGroup], group_id: &str) -> Result<usize, StoreError> {
    let index = position(groups, group_id)?;
    if groups[index].is_remote() {
        return Err(StoreError::Validation(format!(
            "group {group_id} is managed by its subscription"
        )));
    }
    Ok(index)
}

fn subscription_not_found(url: &str) -> StoreError {
    StoreError::NotFound {
        entity: "Subscription",
        id: url.to_owned(),
    }
}

/// Exactly one active group whenever the catalog is non-empty.
fn normalize_active(groups: &mut [ProfileGroup]) {
    let mut seen = false;
    for group in groups.iter_mut() {
        if group.is_active {
            if seen {
                group.is_active = false;
            }
            seen = true;
        }
    }
    if !seen {
        if let Some(first) = groups.first_mut() {
            first.is_active = true;
        }
    }
}

fn check_permutation(current: &[&str], ordered: &[String], what: &str) -> Result<(), StoreError> {
    let unique: HashSet<&str> = ordered.iter().map(String::as_str).collect();
    let matches = ordered.len() == current.len()
        && unique.len() == ordered.len()
        && current.iter().all(|id| unique.contains(id));
    if matches {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "{what} order must list every {what} exactly once"
        )))
    }
}

/// Swap in a fresh server list, keeping health for servers that survived.
fn replace_servers(group: &mut ProfileGroup, mut fresh: Vec<ServerProfile>) {
    for server in &mut fresh {
        if let Some(previous) = group.server(&server.id) {
            server.reachable = previous.reachable;
            server.last_tested = previous.last_tested;
        }
    }
    group.servers = fresh;
    group.touch();
}
