//! Durable audit queue and its single background worker.
//!
//! Per item: `Pending -> Sending -> {Confirmed, Reverted, RetryWait -> Sending, Exhausted}`.
//! Producers only ever see the synchronous enqueue result; delivery outcomes
//! are reported through tracing and [`QueueStats`].

use parking_lot::Mutex;
use screener_shared::TrainingRoundRecord;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{EnqueueRejection, LedgerError, LedgerResult};
use crate::hashing::LedgerMetadata;
use crate::ledger::{Confirmation, LedgerClient, SubmitOutcome};
use crate::rounds::{validate_training_round, LoggedRoundsRegistry};
use crate::trail::AuditTrail;

const FLUSH_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub receipt_timeout: Duration,
    /// Bounded wait on the queue between stop-flag checks
    pub poll_interval: Duration,
}

impl RetryPolicy {
    /// Sleep before the attempt following failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            receipt_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueItem {
    pub record: TrainingRoundRecord,
    pub retries: u32,
}

/// Terminal outcome of one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Confirmed { tx_hash: String, block_number: u64 },
    AlreadyOnChain,
    Reverted { reason: String },
    Exhausted { last_error: String },
    /// Logged by someone else while queued
    Skipped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub confirmed: u64,
    pub already_on_chain: u64,
    pub reverted: u64,
    pub exhausted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    confirmed: AtomicU64,
    already_on_chain: AtomicU64,
    reverted: AtomicU64,
    exhausted: AtomicU64,
}

/// Everything the worker needs, shared with the queue handle
struct WorkerContext {
    client: Arc<LedgerClient>,
    registry: Arc<LoggedRoundsRegistry>,
    trail: Arc<AuditTrail>,
    policy: RetryPolicy,
    depth: AtomicUsize,
    stop: AtomicBool,
    counters: Counters,
}

impl WorkerContext {
    async fn deliver_once(&self, metadata: &LedgerMetadata) -> LedgerResult<Delivery> {
        let tx_hash = match self.client.submit(metadata).await? {
            SubmitOutcome::AlreadyOnChain => return Ok(Delivery::AlreadyOnChain),
            SubmitOutcome::Sent(tx_hash) => tx_hash,
        };
        match self
            .client
            .confirm(&tx_hash, self.policy.receipt_timeout, self.policy.poll_interval)
            .await?
        {
            Confirmation::Confirmed { block_number } => Ok(Delivery::Confirmed {
                tx_hash: tx_hash.to_string(),
                block_number,
            }),
            Confirmation::Reverted { reason } => Ok(Delivery::Reverted { reason }),
        }
    }

    async fn process(&self, mut item: QueueItem) -> Delivery {
        let round = item.record.round_number;
        if self.registry.is_logged(round) {
            warn!(round, "Round already logged locally; skipping");
            return Delivery::Skipped;
        }
        let metadata = LedgerMetadata::from_round(&item.record);

        loop {
            let attempt = item.retries + 1;
            let outcome = match self.deliver_once(&metadata).await {
                Err(LedgerError::Reverted { reason }) => Ok(Delivery::Reverted { reason }),
                other => other,
            };

            match outcome {
                Ok(Delivery::Confirmed { tx_hash, block_number }) => {
                    info!(round, %tx_hash, block_number, attempt, "Round confirmed on ledger");
                    self.registry.mark_logged(round);
                    self.trail.persist_training(&item.record, &tx_hash);
                    self.counters.confirmed.fetch_add(1, Ordering::Relaxed);
                    return Delivery::Confirmed { tx_hash, block_number };
                }
                Ok(Delivery::AlreadyOnChain) => {
                    self.registry.mark_logged(round);
                    self.counters.already_on_chain.fetch_add(1, Ordering::Relaxed);
                    return Delivery::AlreadyOnChain;
                }
                Ok(Delivery::Reverted { reason }) => {
                    error!(round, %reason, "Transaction reverted; not retrying");
                    // Presumed recorded so the round is never resent
                    self.registry.mark_logged(round);
                    self.counters.reverted.fetch_add(1, Ordering::Relaxed);
                    return Delivery::Reverted { reason };
                }
                Ok(other) => return other,
                Err(e) => {
                    item.retries += 1;
                    warn!(round, attempt, error = %e, "Ledger delivery attempt failed");
                    if !e.is_retryable() || item.retries >= self.policy.max_attempts {
                        error!(round, attempts = item.retries, "Exhausted retries; dropping round");
                        self.registry.release(round);
                        self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                        return Delivery::Exhausted {
                            last_error: e.to_string(),
                        };
                    }
                    let backoff = self.policy.backoff_for(item.retries);
                    debug!(round, backoff_ms = backoff.as_millis() as u64, "Backing off before retry");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

async fn run_worker(context: Arc<WorkerContext>, mut receiver: UnboundedReceiver<QueueItem>) -> UnboundedReceiver<QueueItem> {
    info!("Ledger worker started");
    while !context.stop.load(Ordering::SeqCst) {
        let item = match tokio::time::timeout(context.policy.poll_interval, receiver.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(item)) => item,
        };
        let delivery = context.process(item).await;
        let remaining = context.depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(?delivery, queue_size = remaining, "Queue item finished");
    }
    info!("Ledger worker stopped");
    receiver
}

/// FIFO of training rounds awaiting ledger commitment
pub struct LedgerQueue {
    /// Replaced when an aborted worker takes its receiver down with it
    sender: Mutex<UnboundedSender<QueueItem>>,
    parked: Mutex<Option<UnboundedReceiver<QueueItem>>>,
    worker: Mutex<Option<JoinHandle<UnboundedReceiver<QueueItem>>>>,
    context: Arc<WorkerContext>,
}

impl LedgerQueue {
    pub fn new(
        client: Arc<LedgerClient>,
        registry: Arc<LoggedRoundsRegistry>,
        trail: Arc<AuditTrail>,
        policy: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            sender: Mutex::new(sender),
            parked: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            context: Arc::new(WorkerContext {
                client,
                registry,
                trail,
                policy,
                depth: AtomicUsize::new(0),
                stop: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Validate, reserve and queue a round. Never blocks.
    pub fn enqueue(&self, record: TrainingRoundRecord) -> Result<(), EnqueueRejection> {
        let round = record.round_number;
        validate_training_round(round, record.accuracy, &record.model_hash)?;
        let sender = self.sender.lock();
        if let Err(rejection) = self.context.registry.try_reserve(round) {
            warn!(round, "Round already queued or logged; dropping request");
            return Err(rejection);
        }

        let depth = self.context.depth.fetch_add(1, Ordering::SeqCst) + 1;
        if sender.send(QueueItem { record, retries: 0 }).is_err() {
            self.context.depth.fetch_sub(1, Ordering::SeqCst);
            self.context.registry.release(round);
            error!(round, "Ledger queue closed; round not queued");
            return Err(EnqueueRejection::Closed);
        }
        info!(round, queue_size = depth, "Enqueued round for ledger logging");
        Ok(())
    }

    /// Spawn the worker on the current runtime. Returns whether a worker is running.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return true;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "No async runtime; ledger worker not started");
                return false;
            }
        };
        let Some(receiver) = self.parked.lock().take() else {
            error!("Ledger queue has no receiver; worker not started");
            return false;
        };
        self.context.stop.store(false, Ordering::SeqCst);
        *worker = Some(runtime.spawn(run_worker(self.context.clone(), receiver)));
        true
    }

    /// Signal the worker to exit after its current item and wait up to `timeout`.
    ///
    /// Idempotent, and a no-op when the worker was never started.
    pub async fn stop(&self, timeout: Duration) {
        self.context.stop.store(true, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        let Some(mut handle) = handle else {
            return;
        };
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(receiver)) => {
                *self.parked.lock() = Some(receiver);
            }
            Ok(Err(e)) => {
                let dropped = self.reopen();
                error!(error = %e, dropped_rounds = dropped, "Ledger worker terminated abnormally");
            }
            Err(_) => {
                handle.abort();
                // a poll already in progress finishes before cancellation lands
                let _ = handle.await;
                let dropped = self.reopen();
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    dropped_rounds = dropped,
                    "Ledger worker did not stop in time; aborted"
                );
            }
        }
    }

    /// Replace the channel lost with a dead or aborted worker.
    ///
    /// Queued and in-flight rounds are gone, so their reservations are
    /// released and the depth is reset. Returns how many rounds were dropped.
    fn reopen(&self) -> usize {
        let mut sender = self.sender.lock();
        let (fresh, receiver) = unbounded_channel();
        *sender = fresh;
        *self.parked.lock() = Some(receiver);
        self.context.depth.store(0, Ordering::SeqCst);
        self.context.registry.release_pending()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Wait until every queued item reached a terminal state, or `timeout` elapses
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.queue_size() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(queue_size = self.queue_size(), "Flush timeout reached before queue drained");
                return false;
            }
            tokio::time::sleep(FLUSH_POLL).await;
        }
    }

    /// Items queued or in flight
    pub fn queue_size(&self) -> usize {
        self.context.depth.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.context.counters;
        QueueStats {
            confirmed: c.confirmed.load(Ordering::Relaxed),
            already_on_chain: c.already_on_chain.load(Ordering::Relaxed),
            reverted: c.reverted.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for LedgerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerQueue")
            .field("queue_size", &self.queue_size())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for LedgerQueue {
    fn drop(&mut self) {
        self.context.stop.store(true, Ordering::SeqCst);
    }
}
