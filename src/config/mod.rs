use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod fees;
pub mod loader;
pub mod transfer;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Money-moving requests allowed per user per window.
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_ms: u64,
}

impl ServerConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "0.0.0.0:8080".to_string(),
            rate_limit_max_requests: 30,
            rate_limit_window_ms: 60_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub outbox_interval_ms: u64,
    pub dead_letter_interval_ms: u64,
    pub reconciliation_interval_ms: u64,
    /// Ledger entries younger than this are not treated as missing rows.
    pub reconciliation_grace_ms: u64,
    pub max_notification_attempts: u32,
}

impl WorkerConfig {
    pub fn outbox_interval(&self) -> Duration {
        Duration::from_millis(self.outbox_interval_ms)
    }

    pub fn dead_letter_interval(&self) -> Duration {
        Duration::from_millis(self.dead_letter_interval_ms)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_interval_ms)
    }

    pub fn reconciliation_grace(&self) -> Duration {
        Duration::from_millis(self.reconciliation_grace_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            outbox_interval_ms: 5_000,
            dead_letter_interval_ms: 30_000,
            reconciliation_interval_ms: 300_000,
            reconciliation_grace_ms: 60_000,
            max_notification_attempts: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Wallet created at startup by the in-memory deployment.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SeedAccount {
    pub user_id: Option<String>,
    pub wallet_id: Option<String>,
    pub display_name: String,
    pub email: Option<String>,
    pub bank_name: String,
    pub account_number: String,
    pub pin: String,
    pub opening_balance: i64,
}
