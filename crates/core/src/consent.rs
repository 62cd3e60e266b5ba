//! Consent policy: maps an owner's consent level to a retention decision.
//!
//! The policy holds no state beyond its configured windows. The agent
//! evaluates it on every cache and refresh request so that a changed
//! consent level applies to the very next request.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Permission a work's owner grants for offline copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConsentLevel {
    /// Long-term retention is permitted.
    FullOffline,
    /// Only short-lived, in-app copies are permitted.
    TransientOnly,
    /// No copies may be kept.
    Disallowed,
}

impl ConsentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentLevel::FullOffline => "FullOffline",
            ConsentLevel::TransientOnly => "TransientOnly",
            ConsentLevel::Disallowed => "Disallowed",
        }
    }
}

impl fmt::Display for ConsentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FullOffline" => Ok(ConsentLevel::FullOffline),
            "TransientOnly" => Ok(ConsentLevel::TransientOnly),
            "Disallowed" => Ok(ConsentLevel::Disallowed),
            other => Err(format!("unknown consent level: {other}")),
        }
    }
}

/// Outcome of evaluating a consent level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDecision {
    pub permitted: bool,
    pub retention: Duration,
}

/// Retention windows per consent level.
#[derive(Debug, Clone, Copy)]
pub struct ConsentPolicy {
    full_offline: Duration,
    transient: Duration,
}

impl Default for ConsentPolicy {
    fn default() -> Self {
        Self { full_offline: Duration::days(30), transient: Duration::hours(48) }
    }
}

impl ConsentPolicy {
    pub fn new(full_offline: Duration, transient: Duration) -> Self {
        Self { full_offline, transient }
    }

    /// Windows that do not fit a `Duration` saturate; entries built from
    /// them are refused rather than stored with a wrapped expiry.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(window(config.full_offline_retention_secs), window(config.transient_retention_secs))
    }

    /// Decide whether a copy may be kept, and for how long.
    pub fn evaluate(&self, level: ConsentLevel) -> RetentionDecision {
        match level {
            ConsentLevel::FullOffline => RetentionDecision { permitted: true, retention: self.full_offline },
            ConsentLevel::TransientOnly => RetentionDecision { permitted: true, retention: self.transient },
            ConsentLevel::Disallowed => RetentionDecision { permitted: false, retention: Duration::zero() },
        }
    }
}

fn window(secs: u64) -> Duration {
    i64::try_from(secs).ok().and_then(Duration::try_seconds).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let policy = ConsentPolicy::default();

        let full = policy.evaluate(ConsentLevel::FullOffline);
        assert!(full.permitted);
        assert_eq!(full.retention, Duration::days(30));

        let transient = policy.evaluate(ConsentLevel::TransientOnly);
        assert!(transient.permitted);
        assert_eq!(transient.retention, Duration::hours(48));
    }

    #[test]
    fn test_disallowed_never_permitted() {
        let policy = ConsentPolicy::new(Duration::days(365), Duration::days(365));
        let decision = policy.evaluate(ConsentLevel::Disallowed);
        assert!(!decision.permitted);
        assert_eq!(decision.retention, Duration::zero());
    }

    #[test]
    fn test_from_config() {
        let config = AppConfig { full_offline_retention_secs: 600, transient_retention_secs: 60, ..Default::default() };
        let policy = ConsentPolicy::from_config(&config);
        assert_eq!(policy.evaluate(ConsentLevel::FullOffline).retention, Duration::minutes(10));
        assert_eq!(policy.evaluate(ConsentLevel::TransientOnly).retention, Duration::minutes(1));
    }

    #[test]
    fn test_from_config_saturates_oversized_windows() {
        let config = AppConfig {
            full_offline_retention_secs: u64::MAX,
            transient_retention_secs: i64::MAX as u64,
            ..Default::default()
        };
        let policy = ConsentPolicy::from_config(&config);
        assert_eq!(policy.evaluate(ConsentLevel::FullOffline).retention, Duration::MAX);
        assert_eq!(policy.evaluate(ConsentLevel::TransientOnly).retention, Duration::MAX);
    }

    #[test]
    fn test_level_round_trips_through_str() {
        for level in [ConsentLevel::FullOffline, ConsentLevel::TransientOnly, ConsentLevel::Disallowed] {
            assert_eq!(level.as_str().parse::<ConsentLevel>().unwrap(), level);
        }
        assert!("Sometimes".parse::<ConsentLevel>().is_err());
    }
}
