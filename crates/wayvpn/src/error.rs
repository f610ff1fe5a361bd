//! CLI error types with miette diagnostics.
//!
//! Maps core and config failures into user-facing errors with actionable
//! help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use wayvpn_config::ConfigError;
use wayvpn_core::{ParseError, StorageError, StoreError, SyncError};

pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const STORAGE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Descriptors ──────────────────────────────────────────────────

    #[error("Could not parse descriptor: {source}")]
    #[diagnostic(
        code(wayvpn::parse),
        help("Supported schemes: vless://, vmess://, trojan://, ss://, wireguard://")
    )]
    Parse {
        #[source]
        source: ParseError,
    },

    // ── Subscriptions ────────────────────────────────────────────────

    #[error("Could not fetch subscription: {source}")]
    #[diagnostic(
        code(wayvpn::connection_failed),
        help(
            "Check the URL and your network connection.\n\
             Self-signed panels need `accept_invalid_certs = true` under [subscription]."
        )
    )]
    ConnectionFailed {
        #[source]
        source: SyncError,
    },

    #[error("Subscription fetch timed out after {seconds}s")]
    #[diagnostic(
        code(wayvpn::timeout),
        help("Raise `timeout_secs` under [subscription] or try again later.")
    )]
    Timeout { seconds: u64 },

    #[error("Subscription returned nothing usable: {source}")]
    #[diagnostic(
        code(wayvpn::subscription),
        help("Open the URL in a browser to confirm it serves a descriptor list.")
    )]
    Subscription {
        #[source]
        source: SyncError,
    },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(wayvpn::not_found),
        help("Run: wayvpn {list_command} to see what exists")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Storage ──────────────────────────────────────────────────────

    #[error("Profile storage failed")]
    #[diagnostic(
        code(wayvpn::storage),
        help(
            "Check that the store file is writable, or switch backends with\n\
             `backend = \"file\"` under [storage]."
        )
    )]
    Storage {
        #[source]
        source: StorageError,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wayvpn::validation))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(wayvpn::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(wayvpn::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(wayvpn::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(wayvpn::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Storage { .. } => exit_code::STORAGE,
            Self::Parse { .. }
            | Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ConfigExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn group_not_found(id: &str) -> Self {
        Self::NotFound {
            resource_type: "Profile group".into(),
            identifier: id.into(),
            list_command: "profiles list".into(),
        }
    }
}

// ── Core → CliError mapping ──────────────────────────────────────────

impl From<ParseError> for CliError {
    fn from(source: ParseError) -> Self {
        Self::Parse { source }
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            SyncError::Network(_) | SyncError::HttpStatus { .. } => {
                Self::ConnectionFailed { source: err }
            }
            SyncError::InvalidUrl(reason) => Self::Validation {
                field: "url".into(),
                reason,
            },
            SyncError::EmptyBody | SyncError::NoValidEntries { .. } => {
                Self::Subscription { source: err }
            }
        }
    }
}

impl From<StorageError> for CliError {
    fn from(source: StorageError) -> Self {
        Self::Storage { source }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cache(source) => Self::Storage { source },
            StoreError::NotFound { entity, id } => Self::NotFound {
                list_command: if entity == "Server" {
                    "profiles show".into()
                } else {
                    "profiles list".into()
                },
                resource_type: entity.into(),
                identifier: id,
            },
            StoreError::Validation(reason) => Self::Validation {
                field: "input".into(),
                reason,
            },
            StoreError::Parse(source) => Self::Parse { source },
            StoreError::Sync(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_keep_distinct_exit_codes() {
        let missing: CliError = StoreError::NotFound {
            entity: "Profile group",
            id: "g1".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let broken: CliError = StoreError::Cache(StorageError::Io("disk full".into())).into();
        assert_eq!(broken.exit_code(), exit_code::STORAGE);

        let timeout: CliError = SyncError::Timeout { timeout_secs: 15 }.into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let refused: CliError = SyncError::HttpStatus { status: 502 }.into();
        assert_eq!(refused.exit_code(), exit_code::CONNECTION);

        let bad: CliError = ParseError::UnsupportedScheme("http".into()).into();
        assert_eq!(bad.exit_code(), exit_code::USAGE);
    }
}
