// ── Auto-reconnect coordinator ──
//
// Watches connectivity and, on the false -> true edge, drives reconnection
// attempts through the session with a bounded backoff. One background task
// per `start()`; `stop()` cancels and joins it so nothing fires afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconnectPolicy;
use crate::error::SessionError;
use crate::model::{ServerProfile, SessionState};
use crate::persistence::SessionPersistence;
use crate::ports::ConnectivityMonitor;
use crate::session::Session;

/// Progress through one connectivity-loss episode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ReconnectCoordinator {
    session: Session,
    connectivity: Arc<dyn ConnectivityMonitor>,
    persistence: SessionPersistence,
    policy: ReconnectPolicy,
    running: Mutex<Option<Running>>,
    disposed: AtomicBool,
    retry: Arc<std::sync::Mutex<RetryState>>,
}

impl ReconnectCoordinator {
    pub fn new(
        session: Session,
        connectivity: Arc<dyn ConnectivityMonitor>,
        persistence: SessionPersistence,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            session,
            connectivity,
            persistence,
            policy,
            running: Mutex::new(None),
            disposed: AtomicBool::new(false),
            retry: Arc::new(std::sync::Mutex::new(RetryState::default())),
        }
    }

    /// Begin watching connectivity on behalf of `target`, or of the last
    /// persisted session when `None`. Restarts with a fresh retry budget
    /// if already running.
    pub async fn start(&self, target: Option<ServerProfile>) -> Result<(), SessionError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SessionError::Disposed);
        }
        let target = match target {
            Some(profile) => profile,
            None => match self.persistence.load_last().await {
                Some(last) => last.profile,
                None => return Err(SessionError::NoTarget),
            },
        };

        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }
        reset(&self.retry);

        let cancel = CancellationToken::new();
        let watcher = Watcher {
            session: self.session.clone(),
            reachable: self.connectivity.subscribe(),
            states: self.session.state_receiver(),
            policy: self.policy,
            retry: Arc::clone(&self.retry),
            target,
            cancel: cancel.clone(),
        };
        info!(profile = %watcher.target.id, "auto-reconnect armed");
        let handle = tokio::spawn(watcher.run());
        *running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Stop watching. Idempotent; once this returns no attempt will fire.
    pub async fn stop(&self) {
        let previous = self.running.lock().await.take();
        if let Some(previous) = previous {
            previous.cancel.cancel();
            let _ = previous.handle.await;
            debug!("auto-reconnect disarmed");
        }
    }

    /// Stop for good. Later `start()` calls fail with `Disposed`.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.stop().await;
    }

    pub fn retry_state(&self) -> RetryState {
        self.retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn reset(retry: &std::sync::Mutex<RetryState>) {
    *retry.lock().unwrap_or_else(PoisonError::into_inner) = RetryState::default();
}

// ── Watcher task ─────────────────────────────────────────────────────

enum Episode {
    Recovered,
    Exhausted,
    Abandoned,
    Cancelled,
}

struct Watcher {
    session: Session,
    reachable: watch::Receiver<bool>,
    states: watch::Receiver<SessionState>,
    policy: ReconnectPolicy,
    retry: Arc<std::sync::Mutex<RetryState>>,
    target: ServerProfile,
    cancel: CancellationToken,
}

impl Watcher {
    async fn run(mut self) {
        let mut online = *self.reachable.borrow_and_update();
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                changed = self.reachable.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now = *self.reachable.borrow_and_update();
                    let restored = now && !online;
                    online = now;
                    if !restored || self.session.state().is_connected() {
                        continue;
                    }
                    debug!("connectivity restored, reconnecting");
                    match self.episode().await {
                        Episode::Recovered | Episode::Abandoned => {}
                        Episode::Exhausted | Episode::Cancelled => break,
                    }
                }
                changed = self.states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if self.states.borrow_and_update().is_connected() {
                        reset(&self.retry);
                    }
                }
            }
        }
    }

    async fn episode(&self) -> Episode {
        loop {
            if self.session.state().is_connected() {
                reset(&self.retry);
                return Episode::Recovered;
            }

            let attempt = self.current_attempt() + 1;
            if attempt > self.policy.max_attempts {
                warn!(attempts = self.policy.max_attempts, "reconnect attempts exhausted");
                if let Err(e) = self.session.reconnect_exhausted().await {
                    debug!(error = %e, "could not report exhaustion");
                }
                return Episode::Exhausted;
            }

            let delay = self.policy.delay_for_attempt(attempt);
            debug!(attempt, delay_secs = delay.as_secs_f64(), "scheduling reconnect");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Episode::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
            if self.cancel.is_cancelled() {
                return Episode::Cancelled;
            }
            if self.session.state().is_connected() {
                reset(&self.retry);
                return Episode::Recovered;
            }

            {
                let mut retry = self.retry.lock().unwrap_or_else(PoisonError::into_inner);
                retry.attempt = attempt;
                retry.last_attempt_at = Some(Utc::now());
            }
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Episode::Cancelled,
                result = self.session.reconnect(self.target.clone(), attempt) => result,
            };
            match result {
                Ok(()) => {
                    info!(attempt, profile = %self.target.id, "reconnected");
                    reset(&self.retry);
                    return Episode::Recovered;
                }
                Err(SessionError::Engine(e)) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                }
                Err(e) => {
                    debug!(attempt, error = %e, "reconnect episode abandoned");
                    return Episode::Abandoned;
                }
            }
        }
    }

    fn current_attempt(&self) -> u32 {
        self.retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempt
    }
}
