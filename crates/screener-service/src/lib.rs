//! Federated trial screener service.
//!
//! Wires the document store, the audit ledger and the eligibility engine
//! into the operations exposed to hospitals:
//! - trial listing with sampled eligible estimates
//! - per-drug screening with anonymized, paginated results
//! - uploads, logins and frontend activity, audited with throttling
//! - a simulated federated-training session whose rounds land on the ledger

pub mod config;
pub mod error;
pub mod service;
pub mod training;
pub mod upload;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use service::{
    DashboardStats, PatientPage, ScreenerService, ScreeningRequest, ScreeningResponse, ServiceHealth, UploadSummary,
    PRIVACY_NOTICE,
};
pub use training::{model_reference, ModelEvaluator, RoundMetrics, SimulatedEvaluator, TrainingSession, TrainingStatus};
pub use upload::{upload_data_type, JsonNormalizer, UploadGroups, UploadNormalizer, DEFAULT_UPLOAD_GROUP};
