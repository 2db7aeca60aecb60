//! Service-level errors.
//!
//! Audit failures are never represented here: they are logged and dropped
//! so the triggering action still succeeds.

use screener_audit::LedgerError;
use screener_shared::StoreError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Training already in progress")]
    TrainingInProgress,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model evaluation failed: {0}")]
    Evaluation(String),

    #[error("No async runtime available: {0}")]
    Runtime(String),
}

impl ServiceError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        ServiceError::InvalidRequest(msg.into())
    }
}
