//! Ledger configuration.
//!
//! [`LedgerConfig`] is loaded from the process environment with
//! [`LedgerConfig::from_env`]. Tests and embedders that must not touch the
//! environment use [`LedgerConfig::from_lookup`] with their own source.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BLOCKCHAIN_LOCAL` | `true` |
//! | `BLOCKCHAIN_RPC` | `http://127.0.0.1:8545` (local mode only) |
//! | `INFURA_PROJECT_ID` | required when not local |
//! | `PRIVATE_KEY` | optional in local mode (unlocked node account) |
//! | `CONTRACT_ADDRESS` | required |
//! | `LEDGER_STRICT` | `false` |
//! | `LEDGER_RETRY_ATTEMPTS` | `3` |
//! | `LEDGER_RECEIPT_TIMEOUT_SECS` | `120` |
//! | `LEDGER_WORKER_POLL_MS` | `1000` |
//! | `LEDGER_BACKOFF_BASE_MS` | `1000` |
//! | `AUDIT_CACHE_CAPACITY` | `1000` |

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{LedgerError, LedgerResult};
use crate::queue::RetryPolicy;

pub const DEFAULT_LOCAL_RPC: &str = "http://127.0.0.1:8545";
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_WORKER_POLL_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_AUDIT_CACHE_CAPACITY: usize = 1_000;

/// Settings for the chain-backed audit ledger
#[derive(Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Local development node instead of a public network
    pub local: bool,
    pub rpc_url: Option<String>,
    pub infura_project_id: Option<String>,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
    pub contract_address: Option<String>,
    /// Propagate initialization failures instead of falling back to the mock
    pub strict: bool,
    pub retry_attempts: u32,
    pub receipt_timeout_secs: u64,
    pub worker_poll_ms: u64,
    pub backoff_base_ms: u64,
    pub audit_cache_capacity: usize,
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("local", &self.local)
            .field("rpc_url", &self.rpc_url)
            .field("infura_project_id", &self.infura_project_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("contract_address", &self.contract_address)
            .field("strict", &self.strict)
            .field("retry_attempts", &self.retry_attempts)
            .field("receipt_timeout_secs", &self.receipt_timeout_secs)
            .field("worker_poll_ms", &self.worker_poll_ms)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("audit_cache_capacity", &self.audit_cache_capacity)
            .finish()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            local: true,
            rpc_url: None,
            infura_project_id: None,
            private_key: None,
            contract_address: None,
            strict: false,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            receipt_timeout_secs: DEFAULT_RECEIPT_TIMEOUT_SECS,
            worker_poll_ms: DEFAULT_WORKER_POLL_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            audit_cache_capacity: DEFAULT_AUDIT_CACHE_CAPACITY,
        }
    }
}

impl LedgerConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unparsable values keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            local: text("BLOCKCHAIN_LOCAL").map(|v| parse_flag(&v)).unwrap_or(defaults.local),
            rpc_url: text("BLOCKCHAIN_RPC"),
            infura_project_id: text("INFURA_PROJECT_ID"),
            private_key: text("PRIVATE_KEY"),
            contract_address: text("CONTRACT_ADDRESS"),
            strict: text("LEDGER_STRICT").map(|v| parse_flag(&v)).unwrap_or(defaults.strict),
            retry_attempts: parse_or("LEDGER_RETRY_ATTEMPTS", text("LEDGER_RETRY_ATTEMPTS"), defaults.retry_attempts),
            receipt_timeout_secs: parse_or(
                "LEDGER_RECEIPT_TIMEOUT_SECS",
                text("LEDGER_RECEIPT_TIMEOUT_SECS"),
                defaults.receipt_timeout_secs,
            ),
            worker_poll_ms: parse_or("LEDGER_WORKER_POLL_MS", text("LEDGER_WORKER_POLL_MS"), defaults.worker_poll_ms),
            backoff_base_ms: parse_or("LEDGER_BACKOFF_BASE_MS", text("LEDGER_BACKOFF_BASE_MS"), defaults.backoff_base_ms),
            audit_cache_capacity: parse_or(
                "AUDIT_CACHE_CAPACITY",
                text("AUDIT_CACHE_CAPACITY"),
                defaults.audit_cache_capacity,
            ),
        }
    }

    /// RPC endpoint for the configured network
    pub fn resolve_rpc_url(&self) -> LedgerResult<String> {
        if self.local {
            return Ok(self.rpc_url.clone().unwrap_or_else(|| DEFAULT_LOCAL_RPC.to_string()));
        }
        match &self.infura_project_id {
            Some(id) => Ok(format!("https://sepolia.infura.io/v3/{}", id)),
            None => Err(LedgerError::configuration("INFURA_PROJECT_ID not set for non-local network")),
        }
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            receipt_timeout: self.receipt_timeout(),
            poll_interval: Duration::from_millis(self.worker_poll_ms.max(1)),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_or<T: FromStr + Copy>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparsable setting; using default");
            default
        }),
    }
}
