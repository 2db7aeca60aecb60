//! Append-only audit trail.
//!
//! Entries go to a capped in-memory cache and, best effort, to the
//! `audit_logs` collection. Reads prefer the store and fill in cache entries
//! the store is missing, so a store outage degrades to the cache alone.

use parking_lot::Mutex;
use screener_shared::time::{unix_now, unix_now_nanos};
use screener_shared::{
    collections, find_records, insert_record, AuditLogEntry, DocumentStore, Filter, FindOptions, SortDirection,
    TrainingLogDocument, TrainingRoundRecord,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Actor recorded when none is given
pub const SYSTEM_ACTOR: &str = "System";

/// Well-known audit actions
pub mod actions {
    pub const LOGIN: &str = "LOGIN";
    pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
    pub const DATA_UPLOAD: &str = "DATA_UPLOAD";
    pub const DASHBOARD_VIEWED: &str = "DASHBOARD_VIEWED";
    pub const PATIENTS_VIEWED: &str = "PATIENTS_VIEWED";
    pub const TRIALS_VIEWED: &str = "TRIALS_VIEWED";
    pub const ELIGIBILITY_SCREEN: &str = "ELIGIBILITY_SCREEN";
    pub const TRAINING_STARTED: &str = "TRAINING_STARTED";
    pub const TRAINING_STOPPED: &str = "TRAINING_STOPPED";
    pub const TRAINING_ROUND: &str = "TRAINING_ROUND";
    pub const SYSTEM_STARTUP: &str = "SYSTEM_STARTUP";
}

/// An audit event before it is stamped and referenced
#[derive(Clone, Debug, PartialEq)]
pub struct AuditEvent {
    pub action: String,
    pub details: String,
    pub actor: String,
    pub record_count: u64,
    pub metadata: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            details: String::new(),
            actor: SYSTEM_ACTOR.to_string(),
            record_count: 0,
            metadata: Map::new(),
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn record_count(mut self, record_count: u64) -> Self {
        self.record_count = record_count;
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `DATA_UPLOAD` with the standard details line
    pub fn data_upload(data_type: &str, source: &str, record_count: u64, hospitals: &[String]) -> Self {
        let hospital_list = if hospitals.is_empty() {
            "Unknown".to_string()
        } else {
            hospitals.join(", ")
        };
        Self::new(actions::DATA_UPLOAD)
            .details(format!(
                "{} file uploaded from {} ({} records, hospitals: {})",
                data_type, source, record_count, hospital_list
            ))
            .actor(source)
            .record_count(record_count)
            .with_meta("data_type", data_type)
            .with_meta("hospitals", hospitals.to_vec())
            .with_meta("record_count", record_count)
    }

    /// `TRAINING_ROUND` entry mirroring a committed round
    pub fn training_round(record: &TrainingRoundRecord) -> Self {
        Self::new(actions::TRAINING_ROUND)
            .details(format!(
                "Round {} completed — accuracy {:.4}",
                record.round_number, record.accuracy
            ))
            .actor("FL Server")
            .record_count(1)
            .with_meta("round", record.round_number)
            .with_meta("accuracy", record.accuracy)
            .with_meta("model_hash", record.model_hash.clone())
    }

    fn into_entry(self, timestamp: i64, tx_hash: String) -> AuditLogEntry {
        AuditLogEntry {
            action: self.action,
            details: self.details,
            actor: self.actor,
            record_count: self.record_count,
            timestamp,
            metadata: self.metadata,
            tx_hash,
        }
    }
}

pub struct AuditTrail {
    store: Option<Arc<dyn DocumentStore>>,
    cache: Mutex<VecDeque<AuditLogEntry>>,
    capacity: usize,
    counter: AtomicU64,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("has_store", &self.store.is_some())
            .field("cached", &self.cache.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl AuditTrail {
    pub fn new(store: Option<Arc<dyn DocumentStore>>, capacity: usize) -> Self {
        Self {
            store,
            cache: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            counter: AtomicU64::new(0),
        }
    }

    /// `0x` + 40 hex chars derived from `seed`, the clock and a counter
    pub fn synthesize_reference(&self, seed: &str) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let raw = format!("{}_{}_{}", seed, unix_now_nanos(), count);
        let digest = hex::encode(Sha256::digest(raw.as_bytes()));
        format!("0x{}", &digest[..40])
    }

    /// Stamp `event` now under `tx_hash` and append it
    pub fn record_event(&self, event: AuditEvent, tx_hash: String) -> AuditLogEntry {
        let entry = event.into_entry(unix_now(), tx_hash);
        self.append(entry.clone());
        entry
    }

    pub fn append(&self, entry: AuditLogEntry) {
        {
            let mut cache = self.cache.lock();
            if cache.len() >= self.capacity {
                cache.pop_front();
            }
            cache.push_back(entry.clone());
        }

        if let Some(store) = &self.store {
            if let Err(e) = insert_record(store.as_ref(), collections::AUDIT_LOGS, &entry) {
                warn!(action = %entry.action, error = %e, "Could not persist audit log");
            }
        }
    }

    /// Persist a committed round and its `TRAINING_ROUND` audit entry.
    ///
    /// Replaces any document already stored for the round, so a producer's
    /// uncommitted copy gains the `txHash` instead of being duplicated.
    pub fn persist_training(&self, record: &TrainingRoundRecord, tx_hash: &str) {
        if let Some(store) = &self.store {
            let round = Filter::eq("round", record.round_number);
            let document = TrainingLogDocument::from_round(record, Some(tx_hash.to_string()));
            let replaced = store
                .delete_many(collections::TRAINING_LOGS, &round)
                .and_then(|_| insert_record(store.as_ref(), collections::TRAINING_LOGS, &document));
            if let Err(e) = replaced {
                warn!(round = record.round_number, error = %e, "Could not persist training log");
            }
        }
        let entry = AuditEvent::training_round(record).into_entry(record.timestamp, tx_hash.to_string());
        self.append(entry);
    }

    /// Newest-first entries, at most `limit`
    pub fn recent(&self, limit: usize) -> Vec<AuditLogEntry> {
        let cached: Vec<AuditLogEntry> = self.cache.lock().iter().rev().cloned().collect();

        let stored = match &self.store {
            Some(store) => {
                let options = FindOptions::sorted("timestamp", SortDirection::Descending).with_limit(limit);
                match find_records::<AuditLogEntry>(store.as_ref(), collections::AUDIT_LOGS, &Filter::all(), &options) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(error = %e, "Audit store read failed; serving cache");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let known: HashSet<String> = stored.iter().map(|e| e.tx_hash.clone()).collect();
        let mut merged = stored;
        merged.extend(cached.into_iter().filter(|e| !known.contains(&e.tx_hash)));
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged.truncate(limit);
        debug!(returned = merged.len(), "Audit logs read");
        merged
    }

    /// Entries in the store, or in the cache when the store is unreachable
    pub fn count(&self) -> u64 {
        if let Some(store) = &self.store {
            match store.count_documents(collections::AUDIT_LOGS, &Filter::all()) {
                Ok(count) => return count,
                Err(e) => warn!(error = %e, "Audit store count failed; counting cache"),
            }
        }
        self.cache.lock().len() as u64
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn store(&self) -> Option<&Arc<dyn DocumentStore>> {
        self.store.as_ref()
    }
}
