//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Longest retention window accepted for either consent level (10 years).
pub const MAX_RETENTION_SECS: u64 = 10 * 365 * 86_400;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `db_path` is empty, and
    /// `ConfigError::Invalid` if:
    /// - either retention window is 0 or longer than [`MAX_RETENTION_SECS`]
    /// - the transient window is longer than the full offline window
    /// - `max_refreshes` exceeds 100
    /// - `sweep_interval_secs` is outside 1s..=1 day
    /// - `command_timeout_ms` is outside 100ms..=5 minutes
    /// - a channel buffer is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "db_path".into(),
                hint: "Set SHELF_DB_PATH environment variable".into(),
            });
        }

        if self.full_offline_retention_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "full_offline_retention_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.transient_retention_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "transient_retention_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.full_offline_retention_secs > MAX_RETENTION_SECS {
            return Err(ConfigError::Invalid {
                field: "full_offline_retention_secs".into(),
                reason: format!("must not exceed {MAX_RETENTION_SECS} seconds (10 years)"),
            });
        }
        if self.transient_retention_secs > self.full_offline_retention_secs {
            return Err(ConfigError::Invalid {
                field: "transient_retention_secs".into(),
                reason: "must not exceed full_offline_retention_secs".into(),
            });
        }

        if self.max_refreshes > 100 {
            return Err(ConfigError::Invalid { field: "max_refreshes".into(), reason: "must not exceed 100".into() });
        }

        if self.sweep_interval_secs == 0 || self.sweep_interval_secs > 86_400 {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_secs".into(),
                reason: "must be between 1 and 86400 seconds".into(),
            });
        }

        if self.command_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "command_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.command_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "command_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.command_buffer == 0 {
            return Err(ConfigError::Invalid { field: "command_buffer".into(), reason: "must be greater than 0".into() });
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid { field: "event_buffer".into(), reason: "must be greater than 0".into() });
        }

        if self.max_refreshes == 0 {
            tracing::warn!("max_refreshes is 0; retention can never be renewed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_retention_ceiling() {
        let config = AppConfig { full_offline_retention_secs: 10_000_000_000_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "full_offline_retention_secs"));

        let config = AppConfig { full_offline_retention_secs: MAX_RETENTION_SECS, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_db_path() {
        let config = AppConfig { db_path: PathBuf::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Missing { field, .. }) if field == "db_path"));
    }

    #[test]
    fn test_validate_zero_retention() {
        let config = AppConfig { full_offline_retention_secs: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "full_offline_retention_secs"));

        let config = AppConfig { transient_retention_secs: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "transient_retention_secs"));
    }

    #[test]
    fn test_validate_transient_longer_than_full() {
        let config = AppConfig { full_offline_retention_secs: 3600, transient_retention_secs: 7200, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "transient_retention_secs"));
    }

    #[test]
    fn test_validate_refresh_cap() {
        let config = AppConfig { max_refreshes: 101, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_refreshes"));

        let config = AppConfig { max_refreshes: 0, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_sweep_interval_bounds() {
        let config = AppConfig { sweep_interval_secs: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sweep_interval_secs"));

        let config = AppConfig { sweep_interval_secs: 86_401, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sweep_interval_secs"));
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { command_timeout_ms: 50, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "command_timeout_ms"));

        let config = AppConfig { command_timeout_ms: 301_000, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "command_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_buffers() {
        let config = AppConfig { command_buffer: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "command_buffer"));

        let config = AppConfig { event_buffer: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "event_buffer"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            full_offline_retention_secs: 1,
            transient_retention_secs: 1,
            sweep_interval_secs: 1,
            command_timeout_ms: 100,
            ..Default::default()
        }; // minimum valid values
        assert!(config.validate().is_ok());
    }
}
