// ── Runtime configuration ──
//
// Tuning knobs for the core. Never touches disk: the config crate builds a
// `CoreConfig` from file/env layers and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use wayvpn_api::{TlsMode, TransportConfig};

/// TLS verification strategy for subscription endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-hosted panels with self-signed certs).
    DangerAcceptInvalid,
}

/// Reconnect backoff curve.
///
/// The delay before attempt `n` (1-based) is `base_delay * n`. Linear on
/// purpose; it matches deployed clients and stays configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt`. Attempt 0 has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// The full schedule, one entry per allowed attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts)
            .map(|n| self.delay_for_attempt(n))
            .collect()
    }
}

/// How subscription endpoints are fetched.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub tls: TlsVerification,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: None,
            tls: TlsVerification::SystemDefaults,
        }
    }
}

impl SubscriptionSettings {
    /// Translate into the api crate's transport config.
    pub fn transport(&self) -> TransportConfig {
        let mut transport = TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
            ..TransportConfig::default()
        };
        if let Some(ua) = &self.user_agent {
            transport.user_agent.clone_from(ua);
        }
        transport
    }
}

/// Everything the `Controller` needs besides its injected backends.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub reconnect: ReconnectPolicy,
    /// Start the auto-reconnect coordinator on every successful connect.
    pub auto_reconnect: bool,
    pub subscription: SubscriptionSettings,
    /// Capacity of the session command queue.
    pub command_queue_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            auto_reconnect: true,
            subscription: SubscriptionSettings::default(),
            command_queue_size: 64,
        }
    }
}
