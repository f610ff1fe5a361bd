// wayvpn-core: Session lifecycle and profile catalog between the UI and the tunnel engine.

pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod parser;
pub mod persistence;
pub mod ports;
pub mod reconcile;
pub mod reconnect;
pub mod session;
pub mod store;
pub mod stream;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CoreConfig, ReconnectPolicy, SubscriptionSettings, TlsVerification};
pub use controller::{Backends, Controller};
pub use error::{
    CoreError, EngineError, ParseError, SessionError, StorageError, StoreError, SyncError,
};
pub use parser::parse;
pub use persistence::{LastSession, SessionPersistence};
pub use ports::{ConnectivityMonitor, MemoryStore, SecureStore, TunnelEngine};
pub use reconcile::{LifecycleReconciler, ReconcileOutcome};
pub use reconnect::{ReconnectCoordinator, RetryState};
pub use session::Session;
pub use store::{ImportReport, MigrationReport, ProfileStore, Quarantined, SweepReport};
pub use stream::{Subscription, Watched};
pub use subscription::{LineError, SubscriptionSync, SyncOutcome};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    EngineStatus, ErrorReason, GroupId, GroupKind, ProfileGroup, Protocol, ServerProfile,
    SessionState, Source, SubscriptionMeta,
};
