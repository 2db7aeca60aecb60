//! In-process ledger substitute.
//!
//! Commits instantly: no network, no retries, synthesized references. Writes
//! go through the shared [`AuditTrail`] so the store sees the same shapes the
//! chain worker produces.

use parking_lot::RwLock;
use screener_shared::TrainingRoundRecord;
use std::sync::Arc;
use tracing::info;

use crate::error::EnqueueRejection;
use crate::hashing::{verify_metadata, LedgerMetadata};
use crate::logger::{EnqueueReceipt, HealthSnapshot, TrainingLogView};
use crate::rounds::{validate_training_round, LoggedRoundsRegistry};
use crate::trail::{AuditEvent, AuditTrail};

#[derive(Debug)]
pub struct MockLedger {
    trail: Arc<AuditTrail>,
    registry: LoggedRoundsRegistry,
    rounds: RwLock<Vec<TrainingLogView>>,
}

impl MockLedger {
    pub fn new(trail: Arc<AuditTrail>) -> Self {
        info!("Using mock ledger; no chain connection");
        Self {
            trail,
            registry: LoggedRoundsRegistry::new(),
            rounds: RwLock::new(Vec::new()),
        }
    }

    pub fn trail(&self) -> &Arc<AuditTrail> {
        &self.trail
    }

    pub fn enqueue_training_round(&self, record: TrainingRoundRecord) -> Result<EnqueueReceipt, EnqueueRejection> {
        let round = record.round_number;
        validate_training_round(round, record.accuracy, &record.model_hash)?;
        self.registry.try_reserve(round)?;

        let tx_reference = self.trail.synthesize_reference(&format!("training_{}", round));
        let metadata = LedgerMetadata::from_round(&record);
        self.rounds.write().push(TrainingLogView {
            round_number: round,
            accuracy: record.accuracy,
            loss: record.loss,
            metadata_hash: metadata.digest(),
            model_hash: Some(record.model_hash.clone()),
            timestamp: record.timestamp,
            tx_hash: Some(tx_reference.clone()),
        });
        self.trail.persist_training(&record, &tx_reference);
        self.registry.mark_logged(round);

        info!(round, tx_hash = %tx_reference, "Mock committed training round");
        Ok(EnqueueReceipt::Committed { tx_reference })
    }

    pub fn log_event(&self, event: AuditEvent) -> String {
        let tx_reference = self
            .trail
            .synthesize_reference(&format!("{}_{}", event.action, event.details));
        let entry = self.trail.record_event(event, tx_reference.clone());
        info!(action = %entry.action, details = %entry.details, "Mock audit log");
        tx_reference
    }

    pub fn get_logs(&self, from_index: usize, max_count: usize) -> Vec<TrainingLogView> {
        self.rounds
            .read()
            .iter()
            .skip(from_index)
            .take(max_count)
            .cloned()
            .collect()
    }

    pub fn log_count(&self) -> usize {
        self.rounds.read().len()
    }

    pub fn verify(&self, index: usize, local: &LedgerMetadata) -> bool {
        self.rounds
            .read()
            .get(index)
            .is_some_and(|view| verify_metadata(&view.metadata_hash, local))
    }

    pub fn health_check(&self) -> HealthSnapshot {
        HealthSnapshot {
            is_mock: true,
            queue_size: 0,
            logged_rounds_count: self.registry.logged_count(),
            connected: false,
            contract_address: None,
        }
    }
}
