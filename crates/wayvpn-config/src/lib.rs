//! Shared configuration for wayvpn front-ends.
//!
//! TOML file + environment layering, platform paths, the concrete
//! secure-storage backends, and translation to `wayvpn_core::CoreConfig`.

mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wayvpn_core::{CoreConfig, ReconnectPolicy, SecureStore, SubscriptionSettings, TlsVerification};

pub use storage::{FileStore, KEYRING_SERVICE, KeyringStore};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub subscription: SubscriptionConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file under the data directory.
    #[default]
    File,
    /// OS keyring (one entry per key).
    Keyring,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Override the file backend location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_attempts: default_max_attempts(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Accept self-signed certificates from subscription panels.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Path to a custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: None,
            accept_invalid_certs: false,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_queue_size")]
    pub command_queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_queue_size: default_queue_size(),
        }
    }
}

fn default_base_delay() -> u64 {
    2
}
fn default_max_attempts() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    15
}
fn default_queue_size() -> usize {
    64
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "wayvpn", "wayvpn")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory holding the file-backed store.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn home_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("wayvpn");
    p
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file yields the
/// defaults (still overridable from the environment).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WAYVPN_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and build the core's runtime config.
    pub fn to_core_config(&self) -> Result<CoreConfig, ConfigError> {
        if self.reconnect.base_delay_secs == 0 {
            return Err(invalid("reconnect.base_delay_secs", "must be at least 1"));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(invalid("reconnect.max_attempts", "must be at least 1"));
        }
        if self.subscription.timeout_secs == 0 {
            return Err(invalid("subscription.timeout_secs", "must be at least 1"));
        }
        if self.session.command_queue_size == 0 {
            return Err(invalid("session.command_queue_size", "must be at least 1"));
        }

        let tls = if self.subscription.accept_invalid_certs {
            TlsVerification::DangerAcceptInvalid
        } else if let Some(ref ca_path) = self.subscription.ca_cert {
            TlsVerification::CustomCa(ca_path.clone())
        } else {
            TlsVerification::SystemDefaults
        };

        Ok(CoreConfig {
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_secs(self.reconnect.base_delay_secs),
                max_attempts: self.reconnect.max_attempts,
            },
            auto_reconnect: self.reconnect.enabled,
            subscription: SubscriptionSettings {
                timeout: Duration::from_secs(self.subscription.timeout_secs),
                user_agent: self.subscription.user_agent.clone(),
                tls,
            },
            command_queue_size: self.session.command_queue_size,
        })
    }

    /// Where the file backend keeps its data.
    pub fn store_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| data_dir().join("store.json"))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Open the configured secure-storage backend.
pub fn open_storage(cfg: &Config) -> Arc<dyn SecureStore> {
    match cfg.storage.backend {
        StorageBackend::File => Arc::new(FileStore::new(cfg.store_path())),
        StorageBackend::Keyring => Arc::new(KeyringStore::new(KEYRING_SERVICE)),
    }
}
