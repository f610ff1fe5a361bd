// ── Session persistence ──
//
// Remembers the last profile/protocol pairing that reached `Connected`.
// Best-effort: a failed write is logged and dropped, never surfaced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Protocol, ServerProfile};
use crate::ports::SecureStore;

/// Storage key of the last-session record.
pub const LAST_SESSION_KEY: &str = "last_session";

const RECORD_VERSION: u32 = 1;

/// The last successful pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSession {
    pub profile: ServerProfile,
    pub protocol: Protocol,
    pub saved_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    version: u32,
    #[serde(flatten)]
    session: LastSession,
}

#[derive(Clone)]
pub struct SessionPersistence {
    storage: Arc<dyn SecureStore>,
}

impl SessionPersistence {
    pub fn new(storage: Arc<dyn SecureStore>) -> Self {
        Self { storage }
    }

    pub async fn save(&self, profile: &ServerProfile, protocol: Protocol) {
        let record = Record {
            version: RECORD_VERSION,
            session: LastSession {
                profile: profile.clone(),
                protocol,
                saved_at: Utc::now(),
            },
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode last session");
                return;
            }
        };
        match self.storage.write(LAST_SESSION_KEY, &json).await {
            Ok(()) => debug!(profile = %profile.id, "last session saved"),
            Err(e) => warn!(error = %e, "failed to persist last session (non-fatal)"),
        }
    }

    /// The last saved pairing, if one exists and decodes.
    pub async fn load_last(&self) -> Option<LastSession> {
        let json = match self.storage.read(LAST_SESSION_KEY).await {
            Ok(json) => json?,
            Err(e) => {
                warn!(error = %e, "failed to read last session");
                return None;
            }
        };
        match serde_json::from_str::<Record>(&json) {
            Ok(record) if record.version == RECORD_VERSION => Some(record.session),
            Ok(record) => {
                warn!(version = record.version, "ignoring last session with unknown version");
                None
            }
            Err(e) => {
                warn!(error = %e, "ignoring undecodable last session");
                None
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.storage.delete(LAST_SESSION_KEY).await {
            warn!(error = %e, "failed to clear last session (non-fatal)");
        } else {
            debug!("last session cleared");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::MemoryStore;
    use crate::testing::{FailingStore, profile};

    #[tokio::test]
    async fn save_load_clear() {
        let storage = Arc::new(MemoryStore::new());
        let persistence = SessionPersistence::new(storage.clone());
        assert!(persistence.load_last().await.is_none());

        let p = profile("alpha");
        persistence.save(&p, p.protocol).await;
        let last = persistence.load_last().await.unwrap();
        assert_eq!(last.profile, p);
        assert_eq!(last.protocol, p.protocol);

        let stored = storage.read(LAST_SESSION_KEY).await.unwrap().unwrap();
        assert!(stored.contains(r#""version":1"#));

        persistence.clear().await;
        assert!(persistence.load_last().await.is_none());
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let persistence = SessionPersistence::new(Arc::new(FailingStore));
        let p = profile("alpha");
        persistence.save(&p, p.protocol).await;
        persistence.clear().await;
        assert!(persistence.load_last().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_absent() {
        let storage = Arc::new(MemoryStore::new());
        storage.write(LAST_SESSION_KEY, "{not json").await.unwrap();
        let persistence = SessionPersistence::new(storage.clone());
        assert!(persistence.load_last().await.is_none());

        storage
            .write(LAST_SESSION_KEY, r#"{"version":9}"#)
            .await
            .unwrap();
        assert!(persistence.load_last().await.is_none());
    }
}
