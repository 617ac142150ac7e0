use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const MIN_POLL_INTERVAL_MS: u64 = 1_000;
const MAX_VISIBLE_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Connection settings for the notification store and preference API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Fallback refresh cadence while the push channel is down (default: 30s)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Size of the recent-notifications window (default: 5)
    #[serde(default = "default_visible_limit")]
    pub visible_limit: usize,
    /// Timeout applied to every store call made by the engine
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// User the service syncs for; no session when unset
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(AppError::Config(format!(
                "SYNC_POLL_INTERVAL_MS must be at least {} (got {})",
                MIN_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }
        if self.visible_limit == 0 || self.visible_limit > MAX_VISIBLE_LIMIT {
            return Err(AppError::Config(format!(
                "SYNC_VISIBLE_LIMIT must be between 1 and {} (got {})",
                MAX_VISIBLE_LIMIT, self.visible_limit
            )));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            visible_limit: default_visible_limit(),
            request_timeout_ms: default_request_timeout_ms(),
            user_id: None,
        }
    }
}

fn default_env() -> String {
    "development".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_visible_limit() -> usize {
    5
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let app = envy::prefixed("APP_")
            .from_env::<AppConfig>()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let store = envy::prefixed("STORE_")
            .from_env::<StoreConfig>()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let sync = envy::prefixed("SYNC_")
            .from_env::<SyncConfig>()
            .map_err(|e| AppError::Config(e.to_string()))?;

        sync.validate()?;

        Ok(Config { app, store, sync })
    }
}
