//! Canonical metadata hashing.
//!
//! The ledger stores only a SHA-256 digest of each round's metadata. The
//! digest is taken over a key-sorted JSON object with `,` and `:` separators
//! and ASCII-only string escaping, so any conforming implementation computes
//! the same bytes and therefore the same digest.

use screener_shared::TrainingRoundRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Accuracy is committed on-chain as an integer in units of 1/10000
pub const ACCURACY_SCALE: f64 = 10_000.0;

/// Scale an accuracy in `[0, 1]` to the committed integer form
pub fn scale_accuracy(accuracy: f64) -> u64 {
    (accuracy * ACCURACY_SCALE).round().max(0.0) as u64
}

pub fn unscale_accuracy(accuracy_scaled: u64) -> f64 {
    accuracy_scaled as f64 / ACCURACY_SCALE
}

/// The four fields committed for a training round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub round_number: u64,
    pub accuracy_scaled: u64,
    pub model_hash: String,
    pub timestamp: i64,
}

impl LedgerMetadata {
    pub fn from_round(record: &TrainingRoundRecord) -> Self {
        Self {
            round_number: record.round_number,
            accuracy_scaled: scale_accuracy(record.accuracy),
            model_hash: record.model_hash.clone(),
            timestamp: record.timestamp,
        }
    }

    /// Canonical serialization; keys are written in sorted order
    pub fn canonical_json(&self) -> String {
        let mut out = String::with_capacity(96 + self.model_hash.len());
        out.push_str("{\"accuracy_scaled\":");
        let _ = write!(out, "{}", self.accuracy_scaled);
        out.push_str(",\"model_hash\":");
        push_ascii_json_string(&mut out, &self.model_hash);
        out.push_str(",\"round_number\":");
        let _ = write!(out, "{}", self.round_number);
        out.push_str(",\"timestamp\":");
        let _ = write!(out, "{}", self.timestamp);
        out.push('}');
        out
    }

    /// Lowercase hex SHA-256 of [`Self::canonical_json`]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_json().as_bytes()))
    }
}

/// Hash round metadata for commitment
pub fn compute_hash(round_number: u64, accuracy_scaled: u64, model_hash: &str, timestamp: i64) -> String {
    LedgerMetadata {
        round_number,
        accuracy_scaled,
        model_hash: model_hash.to_string(),
        timestamp,
    }
    .digest()
}

/// Compare a ledger-stored digest against locally held metadata.
///
/// Case and an optional `0x` prefix on the stored digest are ignored.
pub fn verify_metadata(stored_hash: &str, local: &LedgerMetadata) -> bool {
    let stored = stored_hash.trim();
    let stored = stored.strip_prefix("0x").unwrap_or(stored);
    stored.eq_ignore_ascii_case(&local.digest())
}

fn push_ascii_json_string(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}
