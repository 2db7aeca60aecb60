//! Federated Screener Shared Utilities
//!
//! This crate provides common functionality for every screener crate:
//! - Persisted record shapes (patients, trials, audit and training logs)
//! - The document-store contract and an in-memory implementation
//! - Input validation with accumulated, field-level errors
//! - Clock helpers

use serde::{Deserialize, Serialize};

// Re-export commonly used items
pub use records::*;
pub use store::*;
pub use validation::*;

/// Persisted record shapes and collection names
pub mod records;

/// Document-store contract consumed by the audit and eligibility crates
pub mod store;

/// Clock helpers
pub mod time {
    /// Current wall-clock time as unix seconds
    pub fn unix_now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Current wall-clock time as unix nanoseconds
    pub fn unix_now_nanos() -> i128 {
        let now = chrono::Utc::now();
        now.timestamp() as i128 * 1_000_000_000 + now.timestamp_subsec_nanos() as i128
    }
}

/// Validation module
///
/// Provides validators for:
/// - Training round numbers
/// - Accuracy scores (0.0 - 1.0)
/// - Model reference hashes
pub mod validation {
    use super::*;

    /// Minimum length of a model reference hash
    pub const MIN_MODEL_HASH_LEN: usize = 8;

    /// Validation error with detailed context
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct ValidationError {
        pub field: String,
        pub message: String,
        pub code: ValidationErrorCode,
    }

    /// Specific validation error codes for programmatic handling
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum ValidationErrorCode {
        Required,
        InvalidFormat,
        OutOfRange,
        TooShort,
    }

    impl std::fmt::Display for ValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}: {} ({:?})", self.field, self.message, self.code)
        }
    }

    impl std::error::Error for ValidationError {}

    /// Validation result that can accumulate multiple errors
    #[derive(Clone, Debug, Default)]
    pub struct ValidationResult {
        pub errors: Vec<ValidationError>,
    }

    impl ValidationResult {
        pub fn new() -> Self {
            Self { errors: Vec::new() }
        }

        pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
            self.errors.push(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
                code,
            });
        }

        pub fn is_valid(&self) -> bool {
            self.errors.is_empty()
        }

        /// First error, if any
        pub fn first(&self) -> Option<&ValidationError> {
            self.errors.first()
        }

        pub fn into_result(self) -> Result<(), ValidationError> {
            match self.errors.into_iter().next() {
                None => Ok(()),
                Some(err) => Err(err),
            }
        }

        pub fn merge(&mut self, other: ValidationResult) {
            self.errors.extend(other.errors);
        }
    }

    /// Validate a training round number (must be positive)
    pub fn validate_round_number(round_number: u64) -> ValidationResult {
        let mut result = ValidationResult::new();

        if round_number == 0 {
            result.add_error(
                "round_number",
                "Round number must be a positive integer",
                ValidationErrorCode::OutOfRange,
            );
        }

        result
    }

    /// Validate an accuracy score (0.0 - 1.0)
    pub fn validate_accuracy(accuracy: f64) -> ValidationResult {
        let mut result = ValidationResult::new();

        if accuracy.is_nan() {
            result.add_error("accuracy", "Accuracy cannot be NaN", ValidationErrorCode::InvalidFormat);
            return result;
        }

        if !(0.0..=1.0).contains(&accuracy) {
            result.add_error(
                "accuracy",
                "Accuracy must be between 0.0 and 1.0",
                ValidationErrorCode::OutOfRange,
            );
        }

        result
    }

    /// Validate a model reference hash
    ///
    /// Must be non-blank and at least [`MIN_MODEL_HASH_LEN`] characters.
    pub fn validate_model_hash(model_hash: &str) -> ValidationResult {
        let mut result = ValidationResult::new();

        if model_hash.trim().is_empty() {
            result.add_error("model_hash", "Model hash is required", ValidationErrorCode::Required);
            return result;
        }

        if model_hash.chars().count() < MIN_MODEL_HASH_LEN {
            result.add_error(
                "model_hash",
                &format!("Model hash must be at least {} characters", MIN_MODEL_HASH_LEN),
                ValidationErrorCode::TooShort,
            );
        }

        result
    }

}
