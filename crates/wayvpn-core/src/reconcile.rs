// ── Lifecycle reconciler ──
//
// After the process comes back to the foreground the engine may have been
// killed behind our back. Compare belief against the engine and correct in
// one direction only: a stale `Connected` becomes a forced disconnect.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::model::{EngineStatus, SessionState};
use crate::ports::TunnelEngine;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Belief and engine agree.
    InSync,
    /// The session believed `Connected` but the engine was down.
    ForcedDisconnect,
    /// Some other disagreement; logged and left alone.
    DriftIgnored,
    /// The session changed before the correction was applied; nothing done.
    Superseded,
}

pub struct LifecycleReconciler {
    session: Session,
    engine: Arc<dyn TunnelEngine>,
}

impl LifecycleReconciler {
    pub fn new(session: Session, engine: Arc<dyn TunnelEngine>) -> Self {
        Self { session, engine }
    }

    pub async fn on_foreground(&self) -> Result<ReconcileOutcome, SessionError> {
        let status = self.engine.current_status().await;
        let belief = self.session.state();

        match (&belief, status) {
            (SessionState::Connected { profile, .. }, EngineStatus::Down | EngineStatus::Stopping) => {
                info!(profile = %profile.id, engine = ?status, "engine lost while backgrounded");
                match self.session.reconcile(belief.clone(), status).await {
                    Ok(()) => Ok(ReconcileOutcome::ForcedDisconnect),
                    Err(SessionError::Superseded) => {
                        debug!("session moved on before the correction landed");
                        Ok(ReconcileOutcome::Superseded)
                    }
                    Err(e) => Err(e),
                }
            }
            (SessionState::Connected { .. }, EngineStatus::Up)
            | (SessionState::Disconnected { .. } | SessionState::Error { .. }, EngineStatus::Down)
            | (
                SessionState::Connecting { .. }
                | SessionState::Reconnecting { .. }
                | SessionState::Disconnecting,
                _,
            ) => Ok(ReconcileOutcome::InSync),
            _ => {
                warn!(state = belief.label(), engine = ?status, "ignoring session drift");
                Ok(ReconcileOutcome::DriftIgnored)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::persistence::SessionPersistence;
    use crate::ports::MemoryStore;
    use crate::testing::{FakeConnectivity, FakeEngine, profile, settle};

    fn setup() -> (Session, Arc<FakeEngine>, FakeConnectivity, LifecycleReconciler) {
        let engine = FakeEngine::new();
        let connectivity = FakeConnectivity::new(true);
        let persistence = SessionPersistence::new(Arc::new(MemoryStore::new()));
        let session = Session::spawn(engine.clone(), &connectivity, persistence, 16);
        let reconciler = LifecycleReconciler::new(session.clone(), engine.clone());
        (session, engine, connectivity, reconciler)
    }

    #[tokio::test(start_paused = true)]
    async fn killed_engine_forces_disconnect() {
        let (session, engine, connectivity, reconciler) = setup();
        session.connect(profile("a")).await.unwrap();

        // Network drops while backgrounded; the OS kills the tunnel silently.
        connectivity.set(false);
        settle().await;
        engine.kill();
        assert!(session.state().is_connected());

        let mut sub = session.subscribe();
        assert_eq!(
            reconciler.on_foreground().await.unwrap(),
            ReconcileOutcome::ForcedDisconnect
        );
        assert!(session.state().is_force_disconnected());
        assert_eq!(
            sub.drain(),
            vec![SessionState::Disconnected { forced: true }]
        );

        // Nothing left to correct.
        assert_eq!(
            reconciler.on_foreground().await.unwrap(),
            ReconcileOutcome::InSync
        );
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn correction_never_lands_on_a_newer_session() {
        let (session, engine, _connectivity, reconciler) = setup();
        session.connect(profile("a")).await.unwrap();
        engine.kill();
        let stale = session.state();

        // A fresh connect to another profile wins the race.
        session.connect(profile("b")).await.unwrap();
        assert_eq!(
            session.reconcile(stale, EngineStatus::Down).await,
            Err(SessionError::Superseded)
        );
        assert_eq!(session.state().profile().unwrap().id, profile("b").id);
        assert!(session.state().is_connected());
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn never_adopts_an_unreported_connection() {
        let (session, engine, _connectivity, reconciler) = setup();
        engine.report(EngineStatus::Up);
        settle().await;

        assert_eq!(
            reconciler.on_foreground().await.unwrap(),
            ReconcileOutcome::DriftIgnored
        );
        assert_eq!(session.state(), SessionState::Disconnected { forced: false });
        session.shutdown().await;
    }
}
