// ── Reactive catalog collection ──
//
// In-memory view of the persisted catalog with O(1) server lookups and
// push-based change notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{GroupId, ProfileGroup, ServerProfile};

pub(crate) type GroupSnapshot = Arc<Vec<Arc<ProfileGroup>>>;

/// The catalog as observers see it.
///
/// Writers always swap in a complete, already-persisted list of groups;
/// there is no partial update. Every swap rebuilds the server index.
pub(crate) struct CatalogCollection {
    /// Secondary index: server id -> id of the first group holding it.
    server_to_group: DashMap<String, GroupId>,

    /// Ordered groups, as persisted.
    snapshot: watch::Sender<GroupSnapshot>,

    /// The active group, notified only when it actually changes.
    active: watch::Sender<Option<Arc<ProfileGroup>>>,
}

impl CatalogCollection {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (active, _) = watch::channel(None);

        Self {
            server_to_group: DashMap::new(),
            snapshot,
            active,
        }
    }

    /// Swap in a new catalog.
    pub(crate) fn replace(&self, groups: Vec<ProfileGroup>) {
        let groups: Vec<Arc<ProfileGroup>> = groups.into_iter().map(Arc::new).collect();

        self.server_to_group.clear();
        for group in &groups {
            for server in &group.servers {
                self.server_to_group
                    .entry(server.id.clone())
                    .or_insert_with(|| group.id.clone());
            }
        }

        let active = groups.iter().find(|g| g.is_active).cloned();
        self.active.send_if_modified(|current| {
            if *current == active {
                false
            } else {
                *current = active;
                true
            }
        });
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(groups));
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> GroupSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Owned copy of every group, for building the next catalog.
    pub(crate) fn to_vec(&self) -> Vec<ProfileGroup> {
        self.snapshot
            .borrow()
            .iter()
            .map(|g| (**g).clone())
            .collect()
    }

    pub(crate) fn active(&self) -> Option<Arc<ProfileGroup>> {
        self.active.borrow().clone()
    }

    pub(crate) fn get(&self, group_id: &str) -> Option<Arc<ProfileGroup>> {
        self.snapshot
            .borrow()
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
    }

    /// Look up a server anywhere in the catalog.
    pub(crate) fn find_server(&self, server_id: &str) -> Option<(Arc<ProfileGroup>, ServerProfile)> {
        let group_id = self.server_to_group.get(server_id)?.value().clone();
        let group = self.get(&group_id)?;
        let server = group.server(server_id)?.clone();
        Some((group, server))
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<GroupSnapshot> {
        self.snapshot.subscribe()
    }

    pub(crate) fn subscribe_active(&self) -> watch::Receiver<Option<Arc<ProfileGroup>>> {
        self.active.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::GroupKind;
    use crate::testing::profile;

    fn group(name: &str, servers: &[&str], active: bool) -> ProfileGroup {
        let mut g = ProfileGroup::new(
            name.into(),
            GroupKind::Local,
            servers.iter().map(|s| profile(s)).collect(),
        );
        g.is_active = active;
        g
    }

    #[test]
    fn replace_rebuilds_index() {
        let c = CatalogCollection::new();
        assert_eq!(c.len(), 0);

        let home = group("home", &["a", "b"], true);
        let home_id = home.id.clone();
        c.replace(vec![home, group("work", &["c"], false)]);

        assert_eq!(c.len(), 2);
        let (g, server) = c.find_server(&profile("c").id).unwrap();
        assert_eq!(g.name, "work");
        assert_eq!(server.name, "c");
        assert_eq!(c.active().unwrap().id, home_id);

        c.replace(vec![group("work", &["c"], true)]);
        assert!(c.find_server(&profile("a").id).is_none());
        assert_eq!(c.active().unwrap().name, "work");
    }

    #[tokio::test]
    async fn active_watch_only_fires_on_change() {
        let c = CatalogCollection::new();
        let home = group("home", &["a"], true);
        c.replace(vec![home.clone()]);

        let mut rx = c.subscribe_active();
        rx.borrow_and_update();

        // Same active group, different sibling: no notification.
        c.replace(vec![home.clone(), group("work", &[], false)]);
        assert!(!rx.has_changed().unwrap());

        c.replace(vec![group("work", &[], true)]);
        assert!(rx.has_changed().unwrap());
    }
}
