//! Time-window suppression of repeated read-triggered audit events.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Last-recorded instant per action key.
///
/// State lives for the lifetime of the registry and is never persisted.
#[derive(Debug, Default)]
pub struct ThrottleRegistry {
    last_logged: Mutex<HashMap<String, Instant>>,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True on the first call for `key` or once `cooldown` has elapsed since
    /// the last true-returning call; records the current instant when true.
    pub fn should_log(&self, key: &str, cooldown: Duration) -> bool {
        self.should_log_at(key, cooldown, Instant::now())
    }

    pub fn should_log_at(&self, key: &str, cooldown: Duration, now: Instant) -> bool {
        let mut last_logged = self.last_logged.lock();
        match last_logged.get(key) {
            Some(previous) if now.saturating_duration_since(*previous) < cooldown => false,
            _ => {
                last_logged.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Forget every key
    pub fn clear(&self) {
        self.last_logged.lock().clear();
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_logged.lock().len()
    }
}
