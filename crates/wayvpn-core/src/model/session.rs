// ── Session state ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::ServerProfile;
use crate::error::EngineError;

/// Live status reported by the Tunnel Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EngineStatus {
    Down,
    Up,
    Starting,
    Stopping,
}

/// Why the session ended up in `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum ErrorReason {
    StartFailed(String),
    StopFailed(String),
    /// Bounded retries ran out. Cleared only by an explicit user action.
    ReconnectExhausted,
}

impl ErrorReason {
    pub(crate) fn start_failed(err: &EngineError) -> Self {
        Self::StartFailed(err.to_string())
    }

    pub(crate) fn stop_failed(err: &EngineError) -> Self {
        Self::StopFailed(err.to_string())
    }
}

/// The single value the UI observes. Exactly one variant holds at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    Disconnected {
        /// Set when the engine was torn down under us rather than by the user.
        forced: bool,
    },
    Connecting {
        profile: ServerProfile,
    },
    #[serde(rename_all = "camelCase")]
    Connected {
        profile: ServerProfile,
        started_at: DateTime<Utc>,
    },
    Disconnecting,
    Reconnecting {
        profile: ServerProfile,
        attempt: u32,
    },
    Error {
        profile: Option<ServerProfile>,
        reason: ErrorReason,
    },
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Disconnected { forced: false }
    }
}

impl SessionState {
    /// Short variant name for logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected { .. } => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Connected { .. } => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Error { .. } => "error",
        }
    }

    /// The profile this state is about, if any.
    pub fn profile(&self) -> Option<&ServerProfile> {
        match self {
            Self::Connecting { profile }
            | Self::Connected { profile, .. }
            | Self::Reconnecting { profile, .. } => Some(profile),
            Self::Error { profile, .. } => profile.as_ref(),
            Self::Disconnected { .. } | Self::Disconnecting => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Whether the user-facing result is a forced disconnect.
    pub fn is_force_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { forced: true })
    }

    /// Time spent connected so far, if connected.
    pub fn session_duration(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match self {
            Self::Connected { started_at, .. } => Some(now - *started_at),
            _ => None,
        }
    }
}
