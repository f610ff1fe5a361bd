// Test doubles shared by the unit tests.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::error::{EngineError, StorageError};
use crate::model::{EngineStatus, ServerProfile};
use crate::parser::parse;
use crate::ports::{ConnectivityMonitor, SecureStore, TunnelEngine};

/// Deterministic profile: the same name always yields the same id.
pub(crate) fn profile(name: &str) -> ServerProfile {
    parse(&format!("trojan://pw@{name}.example.com:443#{name}")).unwrap()
}

/// Let spawned tasks drain their queues. Under paused time the sleep
/// auto-advances once every task is idle.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ── Storage ──────────────────────────────────────────────────────────

pub(crate) struct FailingStore;

#[async_trait]
impl SecureStore for FailingStore {
    async fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Io("disk full".into()))
    }

    async fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Io("disk full".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Io("disk full".into()))
    }
}

/// Writes and deletes never complete; reads find nothing.
pub(crate) struct HangingStore;

#[async_trait]
impl SecureStore for HangingStore {
    async fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        std::future::pending().await
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// Scriptable tunnel engine. Starts and stops never emit status events;
/// tests inject those with [`FakeEngine::report`].
pub(crate) struct FakeEngine {
    status: Mutex<EngineStatus>,
    events: broadcast::Sender<EngineStatus>,
    fail_next: AtomicUsize,
    always_fail: AtomicBool,
    start_delay: Mutex<Duration>,
    starts: Mutex<Vec<(String, Instant)>>,
    stops: AtomicUsize,
}

impl FakeEngine {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            status: Mutex::new(EngineStatus::Down),
            events,
            fail_next: AtomicUsize::new(0),
            always_fail: AtomicBool::new(false),
            start_delay: Mutex::new(Duration::ZERO),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        })
    }

    pub(crate) fn fail_next_starts(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = delay;
    }

    pub(crate) fn started_ids(&self) -> Vec<String> {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub(crate) fn start_times(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Change the live status and notify listeners.
    pub(crate) fn report(&self, status: EngineStatus) {
        *self.status.lock().unwrap() = status;
        let _ = self.events.send(status);
    }

    /// The tunnel died without a callback.
    pub(crate) fn kill(&self) {
        *self.status.lock().unwrap() = EngineStatus::Down;
    }

    fn take_failure(&self) -> bool {
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TunnelEngine for FakeEngine {
    async fn start_tunnel(&self, profile: &ServerProfile) -> Result<(), EngineError> {
        self.starts
            .lock()
            .unwrap()
            .push((profile.id.clone(), Instant::now()));
        let delay = *self.start_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(EngineError::Failed("handshake refused".into()));
        }
        *self.status.lock().unwrap() = EngineStatus::Up;
        Ok(())
    }

    async fn stop_tunnel(&self) -> Result<(), EngineError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.status.lock().unwrap() = EngineStatus::Down;
        Ok(())
    }

    async fn current_status(&self) -> EngineStatus {
        *self.status.lock().unwrap()
    }

    fn status_events(&self) -> broadcast::Receiver<EngineStatus> {
        self.events.subscribe()
    }
}

// ── Connectivity ─────────────────────────────────────────────────────

pub(crate) struct FakeConnectivity {
    tx: watch::Sender<bool>,
}

impl FakeConnectivity {
    pub(crate) fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub(crate) fn set(&self, online: bool) {
        self.tx.send_replace(online);
    }
}

impl ConnectivityMonitor for FakeConnectivity {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
