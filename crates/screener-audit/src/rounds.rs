//! Round-level deduplication.
//!
//! A round is either pending (accepted onto a queue, not yet terminal) or
//! logged (committed, or presumed committed after a revert). Both states
//! block a second enqueue of the same round.

use parking_lot::Mutex;
use screener_shared::{validate_accuracy, validate_model_hash, validate_round_number, ValidationResult};
use std::collections::HashSet;

use crate::error::EnqueueRejection;

#[derive(Debug, Default)]
struct RoundState {
    logged: HashSet<u64>,
    pending: HashSet<u64>,
}

#[derive(Debug, Default)]
pub struct LoggedRoundsRegistry {
    state: Mutex<RoundState>,
}

impl LoggedRoundsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim a round for delivery
    pub fn try_reserve(&self, round_number: u64) -> Result<(), EnqueueRejection> {
        let mut state = self.state.lock();
        if state.logged.contains(&round_number) || state.pending.contains(&round_number) {
            return Err(EnqueueRejection::Duplicate);
        }
        state.pending.insert(round_number);
        Ok(())
    }

    pub fn mark_logged(&self, round_number: u64) {
        let mut state = self.state.lock();
        state.pending.remove(&round_number);
        state.logged.insert(round_number);
    }

    /// Drop a reservation so the round may be enqueued again
    pub fn release(&self, round_number: u64) {
        self.state.lock().pending.remove(&round_number);
    }

    /// Drop every reservation that never reached a terminal state
    pub fn release_pending(&self) -> usize {
        let mut state = self.state.lock();
        let released = state.pending.len();
        state.pending.clear();
        released
    }

    pub fn is_logged(&self, round_number: u64) -> bool {
        self.state.lock().logged.contains(&round_number)
    }

    pub fn logged_count(&self) -> usize {
        self.state.lock().logged.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Validate enqueue input; the first failing field decides the rejection
pub fn validate_training_round(round_number: u64, accuracy: f64, model_hash: &str) -> Result<(), EnqueueRejection> {
    let mut result = ValidationResult::new();
    result.merge(validate_round_number(round_number));
    result.merge(validate_accuracy(accuracy));
    result.merge(validate_model_hash(model_hash));

    match result.first() {
        None => Ok(()),
        Some(err) => Err(EnqueueRejection::from(err)),
    }
}
