// ── Controller facade ──
//
// Wires every component from injected backends and exposes the commands
// and observations a UI layer needs. Owns no state of its own beyond the
// component handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, info};

use crate::config::CoreConfig;
use crate::error::{CoreError, StoreError};
use crate::model::{ProfileGroup, ServerProfile, SessionState};
use crate::persistence::SessionPersistence;
use crate::ports::{ConnectivityMonitor, SecureStore, TunnelEngine};
use crate::reconcile::{LifecycleReconciler, ReconcileOutcome};
use crate::reconnect::{ReconnectCoordinator, RetryState};
use crate::session::Session;
use crate::store::{ImportReport, ProfileStore, SweepReport};
use crate::stream::{Subscription, Watched};
use crate::subscription::SubscriptionSync;

/// The external collaborators the core is built on.
#[derive(Clone)]
pub struct Backends {
    pub engine: Arc<dyn TunnelEngine>,
    pub connectivity: Arc<dyn ConnectivityMonitor>,
    pub storage: Arc<dyn SecureStore>,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Session commands are
/// serialized by the session; catalog commands by the store.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: CoreConfig,
    session: Session,
    store: ProfileStore,
    persistence: SessionPersistence,
    coordinator: ReconnectCoordinator,
    reconciler: LifecycleReconciler,
    shut_down: AtomicBool,
}

impl Controller {
    /// Open the catalog (migrating legacy data if needed) and start the
    /// session. Must be called inside a Tokio runtime.
    pub async fn open(config: CoreConfig, backends: Backends) -> Result<Self, CoreError> {
        let sync = SubscriptionSync::from_settings(&config.subscription, Arc::clone(&backends.storage))?;
        let store = ProfileStore::open(Arc::clone(&backends.storage), sync).await?;
        let persistence = SessionPersistence::new(Arc::clone(&backends.storage));
        let session = Session::spawn(
            Arc::clone(&backends.engine),
            backends.connectivity.as_ref(),
            persistence.clone(),
            config.command_queue_size,
        );
        let coordinator = ReconnectCoordinator::new(
            session.clone(),
            Arc::clone(&backends.connectivity),
            persistence.clone(),
            config.reconnect,
        );
        let reconciler = LifecycleReconciler::new(session.clone(), Arc::clone(&backends.engine));
        debug!(groups = store.groups().len(), "controller ready");

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                session,
                store,
                persistence,
                coordinator,
                reconciler,
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &ProfileStore {
        &self.inner.store
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    // ── Session commands ─────────────────────────────────────────────

    /// Connect to a server from the catalog.
    pub async fn connect(&self, server_id: &str) -> Result<(), CoreError> {
        let profile = self
            .inner
            .store
            .find_server(server_id)
            .ok_or_else(|| StoreError::server_not_found(server_id))?;
        self.connect_profile(profile).await
    }

    /// Reconnect to whatever was used last, preferring the catalog's
    /// current copy of that server.
    pub async fn quick_connect(&self) -> Result<ServerProfile, CoreError> {
        let last = self
            .inner
            .persistence
            .load_last()
            .await
            .ok_or(CoreError::NoLastSession)?;
        let profile = self
            .inner
            .store
            .find_server(&last.profile.id)
            .unwrap_or(last.profile);
        self.connect_profile(profile.clone()).await?;
        Ok(profile)
    }

    /// User-requested disconnect. Stops auto-reconnect first so it cannot
    /// undo the disconnect.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.inner.coordinator.stop().await;
        self.inner.session.disconnect().await?;
        Ok(())
    }

    /// The platform tore the tunnel down (e.g. permission revoked).
    pub async fn force_disconnect(&self) -> Result<(), CoreError> {
        self.inner.coordinator.stop().await;
        self.inner.session.force_disconnect().await?;
        Ok(())
    }

    /// Call when the process returns to the foreground. A forced
    /// disconnect also disarms auto-reconnect, as [`Self::force_disconnect`]
    /// does.
    pub async fn on_foreground(&self) -> Result<ReconcileOutcome, CoreError> {
        let outcome = self.inner.reconciler.on_foreground().await?;
        if outcome == ReconcileOutcome::ForcedDisconnect {
            self.inner.coordinator.stop().await;
        }
        Ok(outcome)
    }

    async fn connect_profile(&self, profile: ServerProfile) -> Result<(), CoreError> {
        info!(profile = %profile.id, name = %profile.name, "connect requested");
        self.inner.session.connect(profile.clone()).await?;
        if self.inner.config.auto_reconnect {
            self.inner.coordinator.start(Some(profile)).await?;
        }
        Ok(())
    }

    // ── Catalog commands ─────────────────────────────────────────────

    pub async fn add_local_profile(
        &self,
        name: &str,
        servers: Vec<ServerProfile>,
    ) -> Result<Arc<ProfileGroup>, CoreError> {
        Ok(self.inner.store.add_local(name, servers).await?)
    }

    pub async fn add_remote_profile(
        &self,
        url: &str,
        name: Option<&str>,
    ) -> Result<Arc<ProfileGroup>, CoreError> {
        Ok(self.inner.store.add_remote(url, name).await?)
    }

    pub async fn import_descriptor(&self, group_id: &str, raw: &str) -> Result<ImportReport, CoreError> {
        Ok(self.inner.store.import(group_id, raw).await?)
    }

    pub async fn delete_profile(&self, group_id: &str) -> Result<(), CoreError> {
        Ok(self.inner.store.delete(group_id).await?)
    }

    pub async fn set_active_profile(&self, group_id: &str) -> Result<Arc<ProfileGroup>, CoreError> {
        Ok(self.inner.store.set_active(group_id).await?)
    }

    pub async fn refresh_subscription(&self, url: &str) -> Result<Arc<ProfileGroup>, CoreError> {
        Ok(self.inner.store.refresh_subscription(url).await?)
    }

    pub async fn refresh_stale_subscriptions(&self) -> SweepReport {
        self.inner.store.refresh_stale_subscriptions().await
    }

    pub async fn record_health(&self, server_id: &str, reachable: bool) -> Result<(), CoreError> {
        Ok(self
            .inner
            .store
            .record_health(server_id, reachable, Utc::now())
            .await?)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Every session transition, in order.
    pub fn states(&self) -> Subscription<SessionState> {
        self.inner.session.subscribe()
    }

    pub fn watch_state(&self) -> Watched<SessionState> {
        self.inner.session.watch()
    }

    pub fn catalog(&self) -> Watched<Arc<Vec<Arc<ProfileGroup>>>> {
        self.inner.store.watch_all()
    }

    pub fn active_profile(&self) -> Watched<Option<Arc<ProfileGroup>>> {
        self.inner.store.watch_active()
    }

    pub fn retry_state(&self) -> RetryState {
        self.inner.coordinator.retry_state()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop every background task. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.coordinator.dispose().await;
        self.inner.session.shutdown().await;
        info!("controller shut down");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::EngineStatus;
    use crate::ports::MemoryStore;
    use crate::testing::{FakeConnectivity, FakeEngine, profile, settle};

    struct Harness {
        controller: Controller,
        engine: Arc<FakeEngine>,
        connectivity: Arc<FakeConnectivity>,
    }

    async fn harness(storage: Arc<MemoryStore>) -> Harness {
        let engine = FakeEngine::new();
        let connectivity = Arc::new(FakeConnectivity::new(true));
        let controller = Controller::open(
            CoreConfig::default(),
            Backends {
                engine: engine.clone(),
                connectivity: connectivity.clone(),
                storage,
            },
        )
        .await
        .unwrap();
        Harness {
            controller,
            engine,
            connectivity,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_by_id_and_quick_connect_after_restart() {
        let storage = Arc::new(MemoryStore::new());
        let h = harness(storage.clone()).await;
        h.controller
            .add_local_profile("Home", vec![profile("a"), profile("b")])
            .await
            .unwrap();

        assert!(h.controller.connect("nope").await.unwrap_err().is_not_found());
        h.controller.connect(&profile("b").id).await.unwrap();
        assert_eq!(h.controller.state().profile().unwrap().id, profile("b").id);
        settle().await;
        h.controller.shutdown().await;
        h.controller.shutdown().await;

        let h = harness(storage.clone()).await;
        let resumed = h.controller.quick_connect().await.unwrap();
        assert_eq!(resumed.id, profile("b").id);
        assert!(h.controller.state().is_connected());

        h.controller.disconnect().await.unwrap();
        settle().await;
        assert!(matches!(
            h.controller.quick_connect().await,
            Err(CoreError::NoLastSession)
        ));
        h.controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_network_returns() {
        let h = harness(Arc::new(MemoryStore::new())).await;
        h.controller
            .add_local_profile("Home", vec![profile("a")])
            .await
            .unwrap();
        h.controller.connect(&profile("a").id).await.unwrap();

        h.connectivity.set(false);
        settle().await;
        h.engine.report(EngineStatus::Down);
        settle().await;
        assert!(matches!(h.controller.state(), SessionState::Reconnecting { .. }));

        h.connectivity.set(true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.controller.state().is_connected());
        assert_eq!(h.controller.retry_state(), RetryState::default());
        h.controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_corrects_a_dead_tunnel() {
        let h = harness(Arc::new(MemoryStore::new())).await;
        h.controller
            .add_local_profile("Home", vec![profile("a")])
            .await
            .unwrap();
        h.controller.connect(&profile("a").id).await.unwrap();
        settle().await;

        h.engine.kill();
        assert_eq!(
            h.controller.on_foreground().await.unwrap(),
            ReconcileOutcome::ForcedDisconnect
        );
        assert!(h.controller.state().is_force_disconnected());

        // Auto-reconnect is disarmed: a connectivity flap starts nothing.
        h.connectivity.set(false);
        settle().await;
        h.connectivity.set(true);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(h.controller.state().is_force_disconnected());
        assert_eq!(h.engine.started_ids().len(), 1);

        // Forced disconnect keeps the quick-connect pointer.
        h.controller.quick_connect().await.unwrap();
        assert!(h.controller.state().is_connected());
        h.controller.shutdown().await;
    }
}
