// ── Core error types ──
//
// Typed failures for every component in the core. None of these cross a
// component boundary as a panic; each public operation returns one of
// them. The `From<wayvpn_api::Error>` impl translates transport failures
// into the subscription sync taxonomy.

use thiserror::Error;

// ── Parser ───────────────────────────────────────────────────────────

/// Failure to turn one descriptor line into a `ServerProfile`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Malformed descriptor: {0}")]
    Malformed(String),
}

impl ParseError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed(detail.into())
    }
}

// ── Subscription sync ────────────────────────────────────────────────

/// Hard failure of a subscription fetch.
///
/// A partially parseable body is not an error; see `SyncOutcome`.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Subscription fetch timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Subscription endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Subscription endpoint returned an empty body")]
    EmptyBody,

    #[error("Subscription contained no valid entries ({rejected} lines rejected)")]
    NoValidEntries { rejected: usize },

    #[error("Invalid subscription URL: {0}")]
    InvalidUrl(String),
}

impl SyncError {
    /// Returns `true` if retrying later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::HttpStatus { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<wayvpn_api::Error> for SyncError {
    fn from(err: wayvpn_api::Error) -> Self {
        match err {
            wayvpn_api::Error::Transport(ref e) if e.is_timeout() => {
                SyncError::Timeout { timeout_secs: 0 }
            }
            wayvpn_api::Error::Transport(e) => SyncError::Network(e.to_string()),
            wayvpn_api::Error::Timeout { timeout_secs } => SyncError::Timeout { timeout_secs },
            wayvpn_api::Error::InvalidUrl(e) => SyncError::InvalidUrl(e.to_string()),
            wayvpn_api::Error::UnsupportedScheme(scheme) => {
                SyncError::InvalidUrl(format!("unsupported scheme '{scheme}'"))
            }
            wayvpn_api::Error::Tls(msg) => SyncError::Network(format!("TLS error: {msg}")),
            wayvpn_api::Error::HttpStatus { status } => SyncError::HttpStatus { status },
            wayvpn_api::Error::EmptyBody => SyncError::EmptyBody,
        }
    }
}

// ── Storage ──────────────────────────────────────────────────────────

/// Failure reported by a `SecureStore` backend.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Profile Store failure taxonomy.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The storage medium is degraded. Surfaced, never fatal.
    #[error("Cache failure: {0}")]
    Cache(#[from] StorageError),

    /// The addressed group or server does not exist (expected, non-exceptional).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn group_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Profile group",
            id: id.to_owned(),
        }
    }

    pub(crate) fn server_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Server",
            id: id.to_owned(),
        }
    }
}

// ── Tunnel engine ────────────────────────────────────────────────────

/// Failure reported by the Tunnel Engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Tunnel engine failed: {0}")]
    Failed(String),

    #[error("Tunnel permission denied")]
    PermissionDenied,

    #[error("Tunnel engine unavailable")]
    Unavailable,
}

// ── Session ──────────────────────────────────────────────────────────

/// Outcome of a command sent to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A newer command replaced this one before it completed.
    #[error("Superseded by a newer connect request")]
    Superseded,

    /// A disconnect cancelled this connect before it completed.
    #[error("Cancelled by disconnect")]
    Cancelled,

    #[error("Session was force-disconnected")]
    ForceDisconnected,

    #[error("Cannot {command} while {state}")]
    InvalidTransition {
        command: &'static str,
        state: &'static str,
    },

    #[error("No target profile available")]
    NoTarget,

    #[error("Component has been disposed")]
    Disposed,

    /// The command processor is no longer running.
    #[error("Session processor stopped")]
    Stopped,
}

// ── Umbrella ─────────────────────────────────────────────────────────

/// Unified error type for the `Controller` facade.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No previous session to reconnect to")]
    NoLastSession,
}

impl CoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}
