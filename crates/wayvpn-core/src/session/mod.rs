// ── Session ──
//
// The single owner of connection state. Every command, engine callback
// and connectivity change is serialized through one bounded queue into
// the command processor, which runs the pure transition table and then
// executes its effects. Engine calls and last-session writes each run on a
// separate worker, strictly in issue order, so the processor stays
// responsive while a start or a storage write is pending.

mod machine;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EngineError, SessionError};
use crate::model::{EngineStatus, ServerProfile, SessionState};
use crate::persistence::SessionPersistence;
use crate::ports::{ConnectivityMonitor, TunnelEngine};
use crate::stream::{Publisher, Subscription, Watched};

use machine::{Effect, Input, Machine, Reply};

type Responder = oneshot::Sender<Result<(), SessionError>>;

struct Envelope {
    input: Input,
    response_tx: Option<Responder>,
}

impl Envelope {
    fn internal(input: Input) -> Self {
        Self {
            input,
            response_tx: None,
        }
    }
}

enum EngineOp {
    Start {
        generation: u64,
        profile: ServerProfile,
    },
    Stop {
        generation: u64,
    },
}

enum PersistOp {
    Save(ServerProfile),
    Clear,
}

/// State shared between the handle and the processor task.
struct Shared {
    state: watch::Sender<SessionState>,
    publisher: Publisher<SessionState>,
}

// ── Session handle ───────────────────────────────────────────────────

/// Handle to the session state machine.
///
/// Cheaply cloneable. Observers get read-only views; every mutation goes
/// through the command queue.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    shared: Arc<Shared>,
    command_tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Start the processor and its feeder tasks. Must be called inside a
    /// Tokio runtime.
    pub fn spawn(
        engine: Arc<dyn TunnelEngine>,
        connectivity: &dyn ConnectivityMonitor,
        persistence: SessionPersistence,
        queue_size: usize,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let shared = Arc::new(Shared {
            state,
            publisher: Publisher::new(),
        });
        let (command_tx, command_rx) = mpsc::channel(queue_size.max(1));
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handles = vec![
            tokio::spawn(command_processor_task(
                Arc::clone(&shared),
                command_rx,
                engine_tx,
                persist_tx,
                cancel.clone(),
            )),
            tokio::spawn(persistence_worker_task(persistence, persist_rx, cancel.clone())),
            tokio::spawn(engine_worker_task(
                Arc::clone(&engine),
                engine_rx,
                command_tx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(engine_status_task(
                engine.status_events(),
                command_tx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(connectivity_task(
                connectivity.subscribe(),
                command_tx.clone(),
                cancel.clone(),
            )),
        ];

        Self {
            inner: Arc::new(SessionInner {
                shared,
                command_tx,
                cancel,
                task_handles: Mutex::new(handles),
            }),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Connect to `profile`. Resolves once the engine is up or the attempt
    /// failed. Connecting to the profile already in use is a no-op; a
    /// different profile disconnects the current one first.
    pub async fn connect(&self, profile: ServerProfile) -> Result<(), SessionError> {
        self.request(Input::Connect(profile)).await
    }

    /// User-requested disconnect. Resolves once the engine is down.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(Input::Disconnect).await
    }

    /// The engine was torn down externally (permission revoked, process
    /// killed). Lands in `Disconnected` with the forced flag set.
    pub async fn force_disconnect(&self) -> Result<(), SessionError> {
        self.request(Input::ForceDisconnect).await
    }

    /// Force a disconnect if the session is still in `observed` and the
    /// engine reported it gone. Fails with [`SessionError::Superseded`]
    /// when the state moved on first.
    pub(crate) async fn reconcile(
        &self,
        observed: SessionState,
        status: EngineStatus,
    ) -> Result<(), SessionError> {
        self.request(Input::Reconcile { observed, status }).await
    }

    /// One reconnection attempt on behalf of the coordinator.
    pub async fn reconnect(&self, profile: ServerProfile, attempt: u32) -> Result<(), SessionError> {
        self.request(Input::Reconnect { profile, attempt }).await
    }

    /// The coordinator ran out of attempts.
    pub async fn reconnect_exhausted(&self) -> Result<(), SessionError> {
        self.request(Input::ReconnectExhausted).await
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Point-in-time state.
    pub fn state(&self) -> SessionState {
        self.inner.shared.state.borrow().clone()
    }

    /// Latest-value view of the state.
    pub fn watch(&self) -> Watched<SessionState> {
        Watched::new(self.inner.shared.state.subscribe())
    }

    /// Every transition from now on, in order, none coalesced.
    pub fn subscribe(&self) -> Subscription<SessionState> {
        self.inner.shared.publisher.subscribe()
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.inner.shared.state.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop every background task. Idempotent; commands issued afterwards
    /// fail with [`SessionError::Stopped`].
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("session stopped");
    }

    async fn request(&self, input: Input) -> Result<(), SessionError> {
        if self.inner.cancel.is_cancelled() {
            return Err(SessionError::Stopped);
        }
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(Envelope {
                input,
                response_tx: Some(tx),
            })
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Run inputs through the machine one at a time and execute the effects.
async fn command_processor_task(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<Envelope>,
    engine_tx: mpsc::UnboundedSender<EngineOp>,
    persist_tx: mpsc::UnboundedSender<PersistOp>,
    cancel: CancellationToken,
) {
    let mut machine = Machine::default();
    let mut start_waiters: HashMap<String, Vec<Responder>> = HashMap::new();
    let mut stop_waiters: Vec<Responder> = Vec::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                debug!(input = envelope.input.label(), state = machine.state().label(), "session input");
                let step = machine.handle(envelope.input, Utc::now());

                if let Some(tx) = envelope.response_tx {
                    match step.reply {
                        Reply::Now(result) => {
                            let _ = tx.send(result);
                        }
                        Reply::AwaitStart(profile_id) => {
                            start_waiters.entry(profile_id).or_default().push(tx);
                        }
                        Reply::AwaitStop => stop_waiters.push(tx),
                    }
                }

                for effect in step.effects {
                    match effect {
                        Effect::Emit(state) => {
                            info!(state = state.label(), "session state entered");
                            shared.state.send_replace(state.clone());
                            shared.publisher.publish(&state);
                        }
                        Effect::StartEngine { generation, profile } => {
                            let _ = engine_tx.send(EngineOp::Start { generation, profile });
                        }
                        Effect::StopEngine { generation } => {
                            let _ = engine_tx.send(EngineOp::Stop { generation });
                        }
                        Effect::Persist(profile) => {
                            let _ = persist_tx.send(PersistOp::Save(profile));
                        }
                        Effect::ClearPersisted => {
                            let _ = persist_tx.send(PersistOp::Clear);
                        }
                        Effect::ResolveStart { profile_id, result } => {
                            for tx in start_waiters.remove(&profile_id).unwrap_or_default() {
                                let _ = tx.send(result.clone());
                            }
                        }
                        Effect::ResolveStop(result) => {
                            for tx in stop_waiters.drain(..) {
                                let _ = tx.send(result.clone());
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Execute engine calls strictly in the order they were issued.
async fn engine_worker_task(
    engine: Arc<dyn TunnelEngine>,
    mut ops: mpsc::UnboundedReceiver<EngineOp>,
    command_tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        let op = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            op = ops.recv() => match op {
                Some(op) => op,
                None => break,
            },
        };

        let input = match op {
            EngineOp::Start {
                generation,
                profile,
            } => {
                debug!(generation, profile = %profile.id, "starting tunnel");
                let result: Result<(), EngineError> = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = engine.start_tunnel(&profile) => result,
                };
                Input::StartFinished { generation, result }
            }
            EngineOp::Stop { generation } => {
                debug!(generation, "stopping tunnel");
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = engine.stop_tunnel() => result,
                };
                Input::StopFinished { generation, result }
            }
        };

        if command_tx.send(Envelope::internal(input)).await.is_err() {
            break;
        }
    }
}

/// Write and clear the last-session record in issue order. A slow or hung
/// backend only delays later writes, never the processor.
async fn persistence_worker_task(
    persistence: SessionPersistence,
    mut ops: mpsc::UnboundedReceiver<PersistOp>,
    cancel: CancellationToken,
) {
    loop {
        let op = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            op = ops.recv() => match op {
                Some(op) => op,
                None => break,
            },
        };

        let write = async {
            match op {
                PersistOp::Save(profile) => persistence.save(&profile, profile.protocol).await,
                PersistOp::Clear => persistence.clear().await,
            }
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = write => {}
        }
    }
}

/// Forward asynchronous engine callbacks into the command queue.
async fn engine_status_task(
    mut events: broadcast::Receiver<EngineStatus>,
    command_tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(status) => {
                    if command_tx.send(Envelope::internal(Input::Engine(status))).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "engine status events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Forward reachability changes so the machine knows whether a dead
/// engine means "network gone" or "engine killed".
async fn connectivity_task(
    mut reachable: watch::Receiver<bool>,
    command_tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) {
    let mut online = *reachable.borrow_and_update();
    loop {
        if command_tx
            .send(Envelope::internal(Input::Connectivity(online)))
            .await
            .is_err()
        {
            break;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = reachable.changed() => {
                if changed.is_err() {
                    break;
                }
                online = *reachable.borrow_and_update();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::EngineError;
    use crate::ports::MemoryStore;
    use crate::testing::{FakeConnectivity, FakeEngine, HangingStore, profile, settle};

    struct Harness {
        session: Session,
        engine: Arc<FakeEngine>,
        connectivity: FakeConnectivity,
        persistence: SessionPersistence,
    }

    fn harness() -> Harness {
        let engine = FakeEngine::new();
        let connectivity = FakeConnectivity::new(true);
        let persistence = SessionPersistence::new(Arc::new(MemoryStore::new()));
        let session = Session::spawn(
            engine.clone(),
            &connectivity,
            persistence.clone(),
            16,
        );
        Harness {
            session,
            engine,
            connectivity,
            persistence,
        }
    }

    fn labels(states: &[SessionState]) -> Vec<&'static str> {
        states.iter().map(SessionState::label).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_publishes_every_transition_and_persists() {
        let h = harness();
        let mut sub = h.session.subscribe();

        h.session.connect(profile("a")).await.unwrap();
        assert!(h.session.state().is_connected());
        assert_eq!(labels(&sub.drain()), vec!["connecting", "connected"]);
        settle().await;
        assert_eq!(
            h.persistence.load_last().await.unwrap().profile.id,
            profile("a").id
        );

        h.session.disconnect().await.unwrap();
        assert_eq!(labels(&sub.drain()), vec!["disconnecting", "disconnected"]);
        settle().await;
        assert!(h.persistence.load_last().await.is_none());
        assert_eq!(h.engine.stop_count(), 1);

        h.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn switching_profiles_renders_intermediate_states() {
        let h = harness();
        h.session.connect(profile("a")).await.unwrap();
        let mut sub = h.session.subscribe();

        h.session.connect(profile("b")).await.unwrap();
        assert_eq!(
            labels(&sub.drain()),
            vec!["disconnecting", "disconnected", "connecting", "connected"]
        );
        assert_eq!(h.engine.started_ids(), vec![profile("a").id, profile("b").id]);
        settle().await;
        assert_eq!(
            h.persistence.load_last().await.unwrap().profile.id,
            profile("b").id
        );

        h.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_lands_in_error() {
        let h = harness();
        h.engine.fail_next_starts(1);

        let err = h.session.connect(profile("a")).await.unwrap_err();
        assert!(matches!(err, SessionError::Engine(EngineError::Failed(_))));
        assert!(matches!(h.session.state(), SessionState::Error { .. }));

        // Disconnect from Error just clears it.
        h.session.disconnect().await.unwrap();
        assert_eq!(h.session.state(), SessionState::Disconnected { forced: false });
        assert_eq!(h.engine.stop_count(), 0);

        h.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_start() {
        let h = harness();
        h.engine.set_start_delay(Duration::from_secs(5));
        let mut sub = h.session.subscribe();

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.connect(profile("a")).await });
        settle().await;

        h.session.disconnect().await.unwrap();
        assert_eq!(pending.await.unwrap(), Err(SessionError::Cancelled));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            labels(&sub.drain()),
            vec!["connecting", "disconnecting", "disconnected"]
        );
        assert_eq!(h.session.state(), SessionState::Disconnected { forced: false });

        h.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn engine_death_depends_on_connectivity() {
        let h = harness();
        h.session.connect(profile("a")).await.unwrap();

        h.engine.report(EngineStatus::Down);
        settle().await;
        assert!(h.session.state().is_force_disconnected());
        // Forced teardown keeps the quick-connect pointer.
        assert!(h.persistence.load_last().await.is_some());

        h.session.connect(profile("a")).await.unwrap();
        h.connectivity.set(false);
        settle().await;
        h.engine.report(EngineStatus::Down);
        settle().await;
        assert!(matches!(
            h.session.state(),
            SessionState::Reconnecting { attempt: 0, .. }
        ));

        h.session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hung_storage_never_blocks_commands() {
        let engine = FakeEngine::new();
        let connectivity = FakeConnectivity::new(true);
        let persistence = SessionPersistence::new(Arc::new(HangingStore));
        let session = Session::spawn(engine.clone(), &connectivity, persistence, 16);

        tokio::time::timeout(Duration::from_secs(60), session.connect(profile("a")))
            .await
            .unwrap()
            .unwrap();
        assert!(session.state().is_connected());

        tokio::time::timeout(Duration::from_secs(60), session.disconnect())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected { forced: false });
        assert_eq!(engine.stop_count(), 1);

        // Shutdown abandons the stuck write.
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn commands_after_shutdown_fail() {
        let h = harness();
        h.session.shutdown().await;
        h.session.shutdown().await;
        assert_eq!(
            h.session.connect(profile("a")).await,
            Err(SessionError::Stopped)
        );
    }
}
