//! Ledger-backed audit logging for the federated trial screener.
//!
//! Training rounds are committed to a distributed ledger through a single
//! background worker with retry, backoff and duplicate suppression. General
//! audit events land in an append-only trail backed by the document store.
//! When the ledger cannot be reached at startup, an in-process mock with the
//! same surface takes over.
//!
//! ```text
//! producer ──enqueue──▶ LedgerQueue ──worker──▶ LedgerClient ──▶ ChainRpc
//!                            │                      │
//!                            ▼                      ▼
//!                 LoggedRoundsRegistry          AuditTrail ──▶ DocumentStore
//! ```

pub mod config;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod logger;
pub mod mock;
pub mod queue;
pub mod rounds;
pub mod throttle;
pub mod trail;

pub use config::LedgerConfig;
pub use error::{EnqueueRejection, LedgerError, LedgerResult, RpcError};
pub use hashing::{compute_hash, scale_accuracy, unscale_accuracy, verify_metadata, LedgerMetadata, ACCURACY_SCALE};
pub use ledger::{ChainRpc, LedgerClient, SimulatedChain};
pub use logger::{enqueue_pair, AuditLedger, ChainAuditLogger, EnqueueReceipt, HealthSnapshot, TrainingLogView};
pub use mock::MockLedger;
pub use queue::{LedgerQueue, QueueStats, RetryPolicy};
pub use rounds::LoggedRoundsRegistry;
pub use throttle::ThrottleRegistry;
pub use trail::{actions, AuditEvent, AuditTrail};
