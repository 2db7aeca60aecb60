//! Simulated federated-training session.
//!
//! The session drives an opaque [`ModelEvaluator`] round by round on a tokio
//! task. Every round is written to `training_logs` before it is handed to the
//! audit ledger, whatever the ledger decides; a ledger commit later stamps the
//! round's document with its `txHash`.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use screener_audit::{actions, enqueue_pair, AuditEvent, AuditLedger};
use screener_shared::time::unix_now;
use screener_shared::{collections, insert_record, DocumentStore, Filter, TrainingLogDocument, TrainingRoundRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{ServiceError, ServiceResult};

pub const TRAINING_ACTOR: &str = "Training Controller";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Produces the metrics of one training round
#[async_trait]
pub trait ModelEvaluator: Send + Sync {
    async fn evaluate(&self, round_number: u64, planned_rounds: u64) -> ServiceResult<RoundMetrics>;
}

/// Demo curve: accuracy climbs from 0.65 towards 0.95 and loss falls from 0.5,
/// both with ±0.05 jitter.
pub struct SimulatedEvaluator {
    rng: Mutex<StdRng>,
}

impl SimulatedEvaluator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn metrics(&self, round_number: u64, planned_rounds: u64) -> RoundMetrics {
        let progress = round_number as f64 / planned_rounds.max(1) as f64;
        let mut rng = self.rng.lock();
        let accuracy = (0.65 + progress * 0.3 + rng.gen_range(-0.05..=0.05)).clamp(0.6, 0.95);
        let loss = (0.5 - progress * 0.3 + rng.gen_range(-0.05..=0.05)).max(0.1);
        RoundMetrics {
            loss: round4(loss),
            accuracy: round4(accuracy),
        }
    }
}

impl Default for SimulatedEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelEvaluator for SimulatedEvaluator {
    async fn evaluate(&self, round_number: u64, planned_rounds: u64) -> ServiceResult<RoundMetrics> {
        Ok(self.metrics(round_number, planned_rounds))
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Content-addressed reference for the model state reached in a round
pub fn model_reference(round_number: u64, metrics: &RoundMetrics) -> String {
    let mut hasher = Sha256::new();
    hasher.update(round_number.to_be_bytes());
    hasher.update(metrics.accuracy.to_be_bytes());
    hasher.update(metrics.loss.to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("model_r{}_{}", round_number, &digest[..16])
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingStatus {
    pub is_training: bool,
    pub rounds_completed: usize,
    pub latest_metrics: Option<TrainingRoundRecord>,
}

struct SessionState {
    ledger: Arc<AuditLedger>,
    store: Option<Arc<dyn DocumentStore>>,
    evaluator: Arc<dyn ModelEvaluator>,
    round_interval: Duration,
    running: AtomicBool,
    /// Bumped on every start so a stopped task cannot resume after a restart
    generation: AtomicU64,
    history: RwLock<Vec<TrainingRoundRecord>>,
}

impl SessionState {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn clear_persisted(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.delete_many(collections::TRAINING_LOGS, &Filter::all()) {
                warn!(error = %e, "Failed to clear training logs");
            }
        }
    }

    fn persist_round(&self, record: &TrainingRoundRecord) {
        if let Some(store) = &self.store {
            let document = TrainingLogDocument::from_round(record, None);
            if let Err(e) = insert_record(store.as_ref(), collections::TRAINING_LOGS, &document) {
                warn!(round = record.round_number, error = %e, "Could not persist training round");
            }
        }
    }

    async fn run(self: Arc<Self>, planned_rounds: u64, generation: u64) {
        self.clear_persisted();
        self.history.write().clear();

        for round in 1..=planned_rounds {
            if !self.is_current(generation) {
                break;
            }
            let metrics = match self.evaluator.evaluate(round, planned_rounds).await {
                Ok(m) => m,
                Err(e) => {
                    error!(round, error = %e, "Model evaluation failed; ending session");
                    break;
                }
            };

            let record = TrainingRoundRecord {
                round_number: round,
                accuracy: metrics.accuracy,
                loss: Some(metrics.loss),
                model_hash: model_reference(round, &metrics),
                timestamp: unix_now(),
            };
            self.history.write().push(record.clone());
            self.persist_round(&record);

            let (accepted, reference) = enqueue_pair(&self.ledger.enqueue_training_round(record));
            if accepted {
                info!(round, accuracy = metrics.accuracy, loss = metrics.loss, "Training round handed to ledger");
            } else {
                warn!(round, reason = reference.as_deref().unwrap_or(""), "Ledger refused training round");
            }

            tokio::time::sleep(self.round_interval).await;
        }

        if self.generation.load(Ordering::SeqCst) == generation {
            self.running.store(false, Ordering::SeqCst);
        }
        info!(rounds = self.history.read().len(), "Training session finished");
    }
}

/// One training session at a time; restartable after it ends
pub struct TrainingSession {
    state: Arc<SessionState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TrainingSession {
    pub fn new(
        ledger: Arc<AuditLedger>,
        store: Option<Arc<dyn DocumentStore>>,
        evaluator: Arc<dyn ModelEvaluator>,
        round_interval: Duration,
    ) -> Self {
        Self {
            state: Arc::new(SessionState {
                ledger,
                store,
                evaluator,
                round_interval,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                history: RwLock::new(Vec::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn a session of `num_rounds` rounds on the current tokio runtime
    pub fn start(&self, num_rounds: u64) -> ServiceResult<()> {
        if num_rounds == 0 {
            return Err(ServiceError::invalid("num_rounds must be at least 1"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| ServiceError::Runtime(e.to_string()))?;
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ServiceError::TrainingInProgress);
        }

        self.state.ledger.log_event(
            AuditEvent::new(actions::TRAINING_STARTED)
                .details(format!("Federated learning training started with {} rounds", num_rounds))
                .actor(TRAINING_ACTOR)
                .record_count(num_rounds),
        );

        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = runtime.spawn(Arc::clone(&self.state).run(num_rounds, generation));
        *self.task.lock() = Some(handle);
        info!(num_rounds, "Training session started");
        Ok(())
    }

    /// Ask the session to end after its current round; false when idle
    pub fn stop(&self) -> bool {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        let completed = self.state.history.read().len();
        self.state.ledger.log_event(
            AuditEvent::new(actions::TRAINING_STOPPED)
                .details(format!("Federated learning training stopped after {} rounds", completed))
                .actor(TRAINING_ACTOR)
                .record_count(completed as u64),
        );
        true
    }

    /// Wait for the spawned session task, if any, to finish
    pub async fn wait(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Training task ended abnormally");
                self.state.running.store(false, Ordering::SeqCst);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> TrainingStatus {
        let history = self.state.history.read();
        TrainingStatus {
            is_training: self.is_active(),
            rounds_completed: history.len(),
            latest_metrics: history.last().cloned(),
        }
    }

    /// Stop silently and drop both in-memory and persisted history
    pub fn reset(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        self.state.history.write().clear();
        self.state.clear_persisted();
    }
}

impl std::fmt::Debug for TrainingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingSession")
            .field("running", &self.is_active())
            .field("rounds_completed", &self.state.history.read().len())
            .finish()
    }
}
