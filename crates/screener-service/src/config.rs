//! Service configuration.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `AUDIT_COOLDOWN_SECS` | `10` |
//! | `ACTIVITY_COOLDOWN_SECS` | `5` |
//! | `LOGIN_FAILED_COOLDOWN_SECS` | `2` |
//! | `TRIAL_SAMPLE_SIZE` | `2000` |
//! | `TRAINING_ROUND_INTERVAL_MS` | `500` |
//! | `AUDIT_LOG_LIMIT` | `500` |
//!
//! Ledger settings are nested and documented on [`LedgerConfig`].

use screener_audit::LedgerConfig;
use screener_eligibility::DEFAULT_SAMPLE_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_AUDIT_COOLDOWN_SECS: u64 = 10;
pub const DEFAULT_ACTIVITY_COOLDOWN_SECS: u64 = 5;
pub const DEFAULT_LOGIN_FAILED_COOLDOWN_SECS: u64 = 2;
pub const DEFAULT_ROUND_INTERVAL_MS: u64 = 500;
pub const DEFAULT_AUDIT_LOG_LIMIT: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Cooldown for read-triggered audit events
    pub audit_cooldown_secs: u64,
    /// Cooldown for frontend activity events
    pub activity_cooldown_secs: u64,
    pub login_failed_cooldown_secs: u64,
    /// Patients screened per trial when estimating eligible counts
    pub trial_sample_size: usize,
    /// Pause between simulated training rounds
    pub round_interval_ms: u64,
    /// Upper bound on audit entries returned by one listing
    pub audit_log_limit: usize,
    pub ledger: LedgerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            audit_cooldown_secs: DEFAULT_AUDIT_COOLDOWN_SECS,
            activity_cooldown_secs: DEFAULT_ACTIVITY_COOLDOWN_SECS,
            login_failed_cooldown_secs: DEFAULT_LOGIN_FAILED_COOLDOWN_SECS,
            trial_sample_size: DEFAULT_SAMPLE_SIZE,
            round_interval_ms: DEFAULT_ROUND_INTERVAL_MS,
            audit_log_limit: DEFAULT_AUDIT_LOG_LIMIT,
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str, default: u64| -> u64 {
            match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                None => default,
                Some(raw) => raw.parse().unwrap_or_else(|_| {
                    warn!(key, value = %raw, "Ignoring unparsable setting; using default");
                    default
                }),
            }
        };

        Self {
            audit_cooldown_secs: read("AUDIT_COOLDOWN_SECS", defaults.audit_cooldown_secs),
            activity_cooldown_secs: read("ACTIVITY_COOLDOWN_SECS", defaults.activity_cooldown_secs),
            login_failed_cooldown_secs: read("LOGIN_FAILED_COOLDOWN_SECS", defaults.login_failed_cooldown_secs),
            trial_sample_size: read("TRIAL_SAMPLE_SIZE", defaults.trial_sample_size as u64) as usize,
            round_interval_ms: read("TRAINING_ROUND_INTERVAL_MS", defaults.round_interval_ms),
            audit_log_limit: read("AUDIT_LOG_LIMIT", defaults.audit_log_limit as u64) as usize,
            ledger: LedgerConfig::from_lookup(&lookup),
        }
    }

    pub fn audit_cooldown(&self) -> Duration {
        Duration::from_secs(self.audit_cooldown_secs)
    }

    pub fn activity_cooldown(&self) -> Duration {
        Duration::from_secs(self.activity_cooldown_secs)
    }

    pub fn login_failed_cooldown(&self) -> Duration {
        Duration::from_secs(self.login_failed_cooldown_secs)
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }
}
