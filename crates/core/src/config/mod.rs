//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELF_*)
//! 2. TOML config file (if SHELF_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{ConfigError, MAX_RETENTION_SECS};

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELF_*)
/// 2. TOML config file (if SHELF_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via SHELF_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Retention window for works whose owner permits full offline copies.
    ///
    /// Set via SHELF_FULL_OFFLINE_RETENTION_SECS environment variable.
    #[serde(default = "default_full_offline_retention_secs")]
    pub full_offline_retention_secs: u64,

    /// Retention window for works whose owner permits only transient copies.
    ///
    /// Set via SHELF_TRANSIENT_RETENTION_SECS environment variable.
    #[serde(default = "default_transient_retention_secs")]
    pub transient_retention_secs: u64,

    /// How many times a single entry may have its retention renewed.
    ///
    /// Set via SHELF_MAX_REFRESHES environment variable.
    #[serde(default = "default_max_refreshes")]
    pub max_refreshes: u32,

    /// Interval between background eviction sweeps.
    ///
    /// Set via SHELF_SWEEP_INTERVAL_SECS environment variable.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How long a client waits for the agent to answer a command.
    ///
    /// Set via SHELF_COMMAND_TIMEOUT_MS environment variable.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Capacity of the agent's command mailbox.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shelf-cache.sqlite")
}

fn default_full_offline_retention_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_transient_retention_secs() -> u64 {
    48 * 60 * 60
}

fn default_max_refreshes() -> u32 {
    3
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

fn default_command_buffer() -> usize {
    64
}

fn default_event_buffer() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            full_offline_retention_secs: default_full_offline_retention_secs(),
            transient_retention_secs: default_transient_retention_secs(),
            max_refreshes: default_max_refreshes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            command_timeout_ms: default_command_timeout_ms(),
            command_buffer: default_command_buffer(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl AppConfig {
    /// Command timeout as Duration for use with tokio.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Sweep interval as Duration for use with tokio.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHELF_`
    /// 2. TOML file from `SHELF_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELF_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELF_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
