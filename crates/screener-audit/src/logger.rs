//! Uniform audit-ledger handle.
//!
//! [`AuditLedger::connect_or_fallback`] tries the chain-backed logger first
//! and falls back to [`MockLedger`] on any initialization failure unless the
//! configuration is strict. Callers never branch on the variant.

use screener_shared::time::unix_now;
use screener_shared::{AuditLogEntry, DocumentStore, TrainingRoundRecord};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::LedgerConfig;
use crate::error::{EnqueueRejection, LedgerError, LedgerResult};
use crate::hashing::LedgerMetadata;
use crate::ledger::{ChainRpc, LedgerClient, OnChainEntry};
use crate::mock::MockLedger;
use crate::queue::{LedgerQueue, QueueStats};
use crate::rounds::LoggedRoundsRegistry;
use crate::trail::{AuditEvent, AuditTrail};

/// Accepted enqueue request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnqueueReceipt {
    /// Waiting for the background worker
    Queued,
    /// Committed immediately under a synthesized reference
    Committed { tx_reference: String },
}

impl EnqueueReceipt {
    pub fn tx_reference(&self) -> Option<&str> {
        match self {
            EnqueueReceipt::Queued => None,
            EnqueueReceipt::Committed { tx_reference } => Some(tx_reference),
        }
    }
}

/// `(accepted, reference_or_error)` as returned to producers
pub fn enqueue_pair(result: &Result<EnqueueReceipt, EnqueueRejection>) -> (bool, Option<String>) {
    match result {
        Ok(receipt) => (true, receipt.tx_reference().map(str::to_string)),
        Err(rejection) => (false, Some(rejection.to_string())),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub is_mock: bool,
    pub queue_size: usize,
    pub logged_rounds_count: usize,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

/// A committed training round as read back from either ledger
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingLogView {
    pub round_number: u64,
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
    pub metadata_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
    pub timestamp: i64,
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl From<OnChainEntry> for TrainingLogView {
    fn from(entry: OnChainEntry) -> Self {
        Self {
            round_number: entry.round_number,
            accuracy: entry.accuracy(),
            loss: None,
            metadata_hash: entry.metadata_hash,
            model_hash: None,
            timestamp: i64::try_from(entry.timestamp).unwrap_or(i64::MAX),
            tx_hash: None,
        }
    }
}

/// Chain-backed logger: adapter, queue and worker
#[derive(Debug)]
pub struct ChainAuditLogger {
    client: Arc<LedgerClient>,
    queue: LedgerQueue,
    registry: Arc<LoggedRoundsRegistry>,
    trail: Arc<AuditTrail>,
}

impl ChainAuditLogger {
    pub fn new(client: LedgerClient, trail: Arc<AuditTrail>, config: &LedgerConfig) -> Self {
        let client = Arc::new(client);
        let registry = Arc::new(LoggedRoundsRegistry::new());
        let queue = LedgerQueue::new(client.clone(), registry.clone(), trail.clone(), config.retry_policy());
        Self {
            client,
            queue,
            registry,
            trail,
        }
    }

    pub fn client(&self) -> &LedgerClient {
        &self.client
    }

    pub fn queue(&self) -> &LedgerQueue {
        &self.queue
    }

    pub fn enqueue_training_round(&self, record: TrainingRoundRecord) -> Result<EnqueueReceipt, EnqueueRejection> {
        self.queue.enqueue(record).map(|()| EnqueueReceipt::Queued)
    }

    /// General audit events stay off-chain; the contract stores training rounds only
    pub fn log_event(&self, event: AuditEvent) -> String {
        let tx_reference = self
            .trail
            .synthesize_reference(&format!("{}_{}", event.action, event.details));
        let entry = self.trail.record_event(event, tx_reference.clone());
        info!(action = %entry.action, details = %entry.details, "Audit log");
        tx_reference
    }

    pub async fn get_logs(&self, from_index: u64, max_count: u64) -> Vec<TrainingLogView> {
        match self.client.read_range(from_index, max_count).await {
            Ok(entries) => entries.into_iter().map(TrainingLogView::from).collect(),
            Err(e) => {
                error!(error = %e, "Error retrieving ledger logs");
                Vec::new()
            }
        }
    }

    pub async fn verify(&self, index: u64, local: &LedgerMetadata) -> bool {
        match self.client.verify_entry(index, local).await {
            Ok(matches) => matches,
            Err(e) => {
                error!(index, error = %e, "Verification failed");
                false
            }
        }
    }

    pub fn health_check(&self) -> HealthSnapshot {
        HealthSnapshot {
            is_mock: false,
            queue_size: self.queue.queue_size(),
            logged_rounds_count: self.registry.logged_count(),
            connected: self.client.is_connected(),
            contract_address: Some(self.client.contract_address().to_string()),
        }
    }
}

/// Audit logger handle: chain-backed or mock, same surface
#[derive(Debug)]
pub enum AuditLedger {
    Chain(ChainAuditLogger),
    Mock(MockLedger),
}

impl AuditLedger {
    /// Try the chain first; on failure fall back to the mock unless `config.strict`.
    ///
    /// A missing transport counts as a configuration failure. The chain
    /// worker is started before returning, so this must run inside a tokio runtime.
    pub async fn connect_or_fallback(
        config: &LedgerConfig,
        rpc: Option<Arc<dyn ChainRpc>>,
        store: Option<Arc<dyn DocumentStore>>,
    ) -> LedgerResult<Self> {
        let trail = Arc::new(AuditTrail::new(store, config.audit_cache_capacity));

        let connected = match rpc {
            Some(rpc) => LedgerClient::connect(config, rpc).await,
            None => Err(LedgerError::configuration("No ledger transport configured")),
        };

        match connected {
            Ok(client) => {
                let chain = ChainAuditLogger::new(client, trail, config);
                chain.queue().start();
                Ok(AuditLedger::Chain(chain))
            }
            Err(e) if config.strict => {
                error!(error = %e, "Ledger initialization failed in strict mode");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Ledger unavailable; falling back to mock");
                Ok(AuditLedger::Mock(MockLedger::new(trail)))
            }
        }
    }

    pub fn mock(store: Option<Arc<dyn DocumentStore>>, cache_capacity: usize) -> Self {
        AuditLedger::Mock(MockLedger::new(Arc::new(AuditTrail::new(store, cache_capacity))))
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, AuditLedger::Mock(_))
    }

    fn trail(&self) -> &Arc<AuditTrail> {
        match self {
            AuditLedger::Chain(chain) => &chain.trail,
            AuditLedger::Mock(mock) => mock.trail(),
        }
    }

    /// Queue a round stamped now
    pub fn enqueue_training_metadata(
        &self,
        round_number: u64,
        accuracy: f64,
        model_hash: &str,
    ) -> Result<EnqueueReceipt, EnqueueRejection> {
        self.enqueue_training_round(TrainingRoundRecord {
            round_number,
            accuracy,
            loss: None,
            model_hash: model_hash.to_string(),
            timestamp: unix_now(),
        })
    }

    pub fn enqueue_training_round(&self, record: TrainingRoundRecord) -> Result<EnqueueReceipt, EnqueueRejection> {
        match self {
            AuditLedger::Chain(chain) => chain.enqueue_training_round(record),
            AuditLedger::Mock(mock) => mock.enqueue_training_round(record),
        }
    }

    /// Record an audit event; returns its transaction reference
    pub fn log_event(&self, event: AuditEvent) -> String {
        match self {
            AuditLedger::Chain(chain) => chain.log_event(event),
            AuditLedger::Mock(mock) => mock.log_event(event),
        }
    }

    pub fn log_data_upload(&self, data_type: &str, source: &str, record_count: u64, hospitals: &[String]) -> String {
        self.log_event(AuditEvent::data_upload(data_type, source, record_count, hospitals))
    }

    pub fn log_patient_action(&self, action: &str, patient_count: u64, actor: &str, details: &str) -> String {
        self.log_event(
            AuditEvent::new(action)
                .details(details)
                .actor(actor)
                .record_count(patient_count),
        )
    }

    pub async fn get_logs(&self, from_index: u64, max_count: u64) -> Vec<TrainingLogView> {
        match self {
            AuditLedger::Chain(chain) => chain.get_logs(from_index, max_count).await,
            AuditLedger::Mock(mock) => mock.get_logs(
                usize::try_from(from_index).unwrap_or(usize::MAX),
                usize::try_from(max_count).unwrap_or(usize::MAX),
            ),
        }
    }

    /// Newest-first audit entries, at most `limit`
    pub fn get_audit_logs(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.trail().recent(limit)
    }

    pub fn audit_log_count(&self) -> u64 {
        self.trail().count()
    }

    pub async fn verify(&self, index: u64, local: &LedgerMetadata) -> bool {
        match self {
            AuditLedger::Chain(chain) => chain.verify(index, local).await,
            AuditLedger::Mock(mock) => mock.verify(usize::try_from(index).unwrap_or(usize::MAX), local),
        }
    }

    /// Never blocks and never fails
    pub fn health_check(&self) -> HealthSnapshot {
        match self {
            AuditLedger::Chain(chain) => chain.health_check(),
            AuditLedger::Mock(mock) => mock.health_check(),
        }
    }

    pub fn queue_stats(&self) -> QueueStats {
        match self {
            AuditLedger::Chain(chain) => chain.queue().stats(),
            AuditLedger::Mock(_) => QueueStats::default(),
        }
    }

    /// Wait for queued rounds to reach a terminal state; the mock is always drained
    pub async fn flush(&self, timeout: Duration) -> bool {
        match self {
            AuditLedger::Chain(chain) => chain.queue().flush(timeout).await,
            AuditLedger::Mock(_) => true,
        }
    }

    pub fn start(&self) -> bool {
        match self {
            AuditLedger::Chain(chain) => chain.queue().start(),
            AuditLedger::Mock(_) => true,
        }
    }

    pub async fn stop(&self, timeout: Duration) {
        if let AuditLedger::Chain(chain) = self {
            chain.queue().stop(timeout).await;
        }
    }
}
