// ── External collaborators ──
//
// The core never talks to a platform directly. Everything outside the
// process boundary is injected behind one of these traits at construction.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

use crate::error::{EngineError, StorageError};
use crate::model::{EngineStatus, ServerProfile};

/// The native component that actually establishes the encrypted tunnel.
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    /// Bring the tunnel up for `profile`. Resolves once the engine has
    /// either established the tunnel or given up.
    async fn start_tunnel(&self, profile: &ServerProfile) -> Result<(), EngineError>;

    /// Tear the tunnel down. Stopping an already-stopped engine succeeds.
    async fn stop_tunnel(&self) -> Result<(), EngineError>;

    /// Query the engine's live status.
    async fn current_status(&self) -> EngineStatus;

    /// Asynchronous status callbacks from the engine.
    fn status_events(&self) -> broadcast::Receiver<EngineStatus>;
}

/// Binary network-reachability source.
///
/// Only the `false -> true` edge is actionable for the core.
pub trait ConnectivityMonitor: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Durable, at-rest-protected key/value storage. Values are opaque
/// strings (callers JSON-encode).
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

// ── In-memory store ──────────────────────────────────────────────────

/// Process-local `SecureStore`. Nothing survives the process; used for
/// ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.read("k").await.unwrap().is_none());

        store.write("k", "v1").await.unwrap();
        store.write("k", "v2").await.unwrap();
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.keys(), vec!["k".to_string()]);

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
    }
}
