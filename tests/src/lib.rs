//! Federated Screener Test Suite
//!
//! Cross-crate scenario tests for the screening service:
//! - Duplicate round suppression on both ledger backings
//! - Chain delivery under send failures, reverts and lost receipts
//! - Fallback transparency between chain and mock
//! - Screening and trial estimation over large populations

pub mod fixtures;

pub mod duplicate_rounds;
pub mod chain_delivery;
pub mod fallback;
pub mod screening_scale;
