//! Error types for ledger-backed audit logging.
//!
//! ## Hierarchy
//!
//! ```text
//! LedgerError          (adapter and worker outcomes)
//! ├── Configuration    fatal at connect time, recovered by mock fallback
//! ├── TransientSend    retried with exponential backoff
//! ├── Reverted         never retried
//! └── Timeout          receipt did not arrive in time, retried
//!
//! RpcError             (raw transport faults, folded into LedgerError)
//!
//! EnqueueRejection     (synchronous refusal at the enqueue boundary)
//! ```

use screener_shared::ValidationError;
use std::time::Duration;
use thiserror::Error;

/// Convenient `Result` alias for adapter and worker operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Faults reported by a chain transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("RPC endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Contract function `{0}` is not callable")]
    UnknownFunction(String),

    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    #[error("Timed out waiting for receipt of {0}")]
    ReceiptTimeout(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Outcome errors of the ledger adapter and worker.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    /// Missing or invalid settings, unreachable endpoint, unknown contract shape.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Submission or confirmation failed for a reason other than a revert.
    #[error("Transient send failure: {0}")]
    TransientSend(String),

    /// The ledger rejected the transaction logically.
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },

    /// No receipt within the confirmation window.
    #[error("Timed out after {waited:?} waiting for receipt of {tx_hash}")]
    Timeout { tx_hash: String, waited: Duration },
}

impl LedgerError {
    /// Construct a [`LedgerError::Configuration`].
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        LedgerError::Configuration(msg.into())
    }

    /// Whether the worker should try again after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransientSend(_) | LedgerError::Timeout { .. })
    }
}

impl From<RpcError> for LedgerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::ExecutionReverted(reason) => LedgerError::Reverted { reason },
            other => LedgerError::TransientSend(other.to_string()),
        }
    }
}

/// Reasons an enqueue request is refused without touching the queue.
///
/// `Display` yields the wire strings returned to producers.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EnqueueRejection {
    #[error("invalid round")]
    InvalidRound,

    #[error("invalid accuracy")]
    InvalidAccuracy,

    #[error("invalid model_hash")]
    InvalidModelHash,

    /// Soft rejection: the round is already logged or queued.
    #[error("duplicate")]
    Duplicate,

    /// The worker's queue was dropped before the item could be sent.
    #[error("queue closed")]
    Closed,
}

impl EnqueueRejection {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueRejection::Duplicate)
    }
}

impl From<&ValidationError> for EnqueueRejection {
    fn from(err: &ValidationError) -> Self {
        match err.field.as_str() {
            "round_number" => EnqueueRejection::InvalidRound,
            "accuracy" => EnqueueRejection::InvalidAccuracy,
            _ => EnqueueRejection::InvalidModelHash,
        }
    }
}
