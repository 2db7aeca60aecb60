//! Screening service facade.
//!
//! Owns the document store, the audit ledger, the throttle and the training
//! session, and exposes the operations an HTTP layer would route to. Audit
//! writes never fail the operation that triggered them.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use screener_audit::{actions, AuditEvent, AuditLedger, ChainRpc, HealthSnapshot, ThrottleRegistry, TrainingLogView};
use screener_eligibility::{
    build_params, classify_and_paginate, default_trials, resolve_indication, summarize_trials, PageResult,
    Tab, TrialEligibilityParams, TrialSummary, DEFAULT_PAGE_SIZE,
};
use screener_shared::{
    collections, count_by_field, find_records, insert_record, AuditLogEntry, DocumentStore, Filter, FindOptions,
    PatientRecord, TrialDefinition,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::ServiceResult;
use crate::training::{ModelEvaluator, TrainingSession, TrainingStatus};
use crate::upload::{upload_data_type, UploadGroups, UploadNormalizer, DEFAULT_UPLOAD_GROUP};

pub const PRIVACY_NOTICE: &str =
    "Patient identities are anonymized. Only medical and demographic data is shared for trial eligibility screening.";

/// Upload columns that never reach the `patients` collection
const STRIPPED_UPLOAD_FIELDS: [&str; 3] = ["eligible", "drug", "drug_worked"];

const MAX_PATIENT_PAGE_SIZE: usize = 200;

#[derive(Clone, Debug)]
pub struct ScreeningRequest {
    pub drug_name: String,
    pub hospital: Option<String>,
    pub page: usize,
    pub page_size: usize,
    pub tab: Tab,
}

impl ScreeningRequest {
    pub fn new(drug_name: impl Into<String>) -> Self {
        Self {
            drug_name: drug_name.into(),
            hospital: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            tab: Tab::Eligible,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScreeningResponse {
    pub drug: String,
    pub hospital: Option<String>,
    pub trial_params: TrialEligibilityParams,
    pub privacy_mode: bool,
    pub privacy_notice: &'static str,
    #[serde(flatten)]
    pub page: PageResult,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploadSummary {
    pub new_patients: usize,
    pub hospitals_in_file: Vec<String>,
    pub total_patients: u64,
    pub tx_reference: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_patients: u64,
    pub total_trials: usize,
    pub unique_diseases: usize,
    pub is_training: bool,
    pub rounds_completed: usize,
    /// Percentage, one decimal
    pub latest_accuracy: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PatientPage {
    pub patients: Vec<PatientRecord>,
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub status: &'static str,
    pub ledger: HealthSnapshot,
    pub store_connected: bool,
    pub training_active: bool,
}

pub struct ScreenerService {
    config: ServiceConfig,
    store: Arc<dyn DocumentStore>,
    ledger: Arc<AuditLedger>,
    throttle: ThrottleRegistry,
    training: TrainingSession,
    rng: Mutex<StdRng>,
}

impl ScreenerService {
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn DocumentStore>,
        ledger: Arc<AuditLedger>,
        evaluator: Arc<dyn ModelEvaluator>,
    ) -> Self {
        let training = TrainingSession::new(
            Arc::clone(&ledger),
            Some(Arc::clone(&store)),
            evaluator,
            config.round_interval(),
        );
        Self {
            config,
            store,
            ledger,
            throttle: ThrottleRegistry::new(),
            training,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Build the ledger from `config.ledger` (chain first, mock fallback) and wire the service
    pub async fn connect(
        config: ServiceConfig,
        store: Arc<dyn DocumentStore>,
        rpc: Option<Arc<dyn ChainRpc>>,
        evaluator: Arc<dyn ModelEvaluator>,
    ) -> ServiceResult<Self> {
        let ledger = AuditLedger::connect_or_fallback(&config.ledger, rpc, Some(Arc::clone(&store))).await?;
        Ok(Self::new(config, store, Arc::new(ledger), evaluator))
    }

    /// Fix the sampling RNG for reproducible trial estimates
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn training(&self) -> &TrainingSession {
        &self.training
    }

    /// Log `event` unless `key` was logged within `cooldown`
    fn audit_keyed(&self, key: &str, event: AuditEvent, cooldown: Duration) -> Option<String> {
        if !self.throttle.should_log(key, cooldown) {
            return None;
        }
        Some(self.ledger.log_event(event))
    }

    fn audit(&self, event: AuditEvent, cooldown: Duration) -> Option<String> {
        let key = event.action.clone();
        self.audit_keyed(&key, event, cooldown)
    }

    fn always(&self, event: AuditEvent) -> String {
        self.audit(event, Duration::ZERO).unwrap_or_default()
    }

    // ==================== DATA ====================

    pub fn load_patients(&self) -> ServiceResult<Vec<PatientRecord>> {
        Ok(find_records(self.store.as_ref(), collections::PATIENTS, &Filter::all(), &FindOptions::default())?)
    }

    pub fn load_trials(&self) -> ServiceResult<Vec<TrialDefinition>> {
        Ok(find_records(self.store.as_ref(), collections::TRIALS, &Filter::all(), &FindOptions::default())?)
    }

    pub fn disease_counts(&self) -> ServiceResult<HashMap<String, u64>> {
        Ok(count_by_field(self.store.as_ref(), collections::PATIENTS, "disease")?)
    }

    /// Insert the default catalogue when the `trials` collection is empty
    pub fn seed_default_trials(&self) -> ServiceResult<usize> {
        let existing = self.store.count_documents(collections::TRIALS, &Filter::all())?;
        if existing > 0 {
            info!(existing, "Trials collection already populated");
            return Ok(0);
        }
        let trials = default_trials();
        for trial in &trials {
            insert_record(self.store.as_ref(), collections::TRIALS, trial)?;
        }
        info!(count = trials.len(), "Seeded trial definitions");
        Ok(trials.len())
    }

    /// Seed trials and record `SYSTEM_STARTUP`; returns the patient count
    pub fn startup(&self) -> u64 {
        if let Err(e) = self.seed_default_trials() {
            warn!(error = %e, "Could not seed trial definitions");
        }
        let patients = self
            .store
            .count_documents(collections::PATIENTS, &Filter::all())
            .unwrap_or_else(|e| {
                warn!(error = %e, "Could not count patients at startup");
                0
            });
        self.always(
            AuditEvent::new(actions::SYSTEM_STARTUP)
                .details(format!("FDTES API server started with {} patients loaded", patients))
                .record_count(patients),
        );
        patients
    }

    /// Normalize a raw upload and store it; `hospital` names records without one
    pub fn upload_file(
        &self,
        normalizer: &dyn UploadNormalizer,
        raw: &[u8],
        filename: &str,
        hospital: Option<&str>,
    ) -> ServiceResult<UploadSummary> {
        let data_type = upload_data_type(filename)?;
        let groups = normalizer.normalize(raw, filename, hospital.unwrap_or(DEFAULT_UPLOAD_GROUP))?;
        self.ingest_upload(&data_type, groups)
    }

    /// Store normalized upload groups (hospital → records) and record `DATA_UPLOAD`
    pub fn ingest_upload(&self, data_type: &str, groups: UploadGroups) -> ServiceResult<UploadSummary> {
        let hospitals_in_file: Vec<String> = groups.iter().map(|(hospital, _)| hospital.clone()).collect();
        let mut inserted = 0usize;
        for (_, records) in groups {
            for mut record in records {
                record.hospital = None;
                for field in STRIPPED_UPLOAD_FIELDS {
                    record.extra.remove(field);
                }
                insert_record(self.store.as_ref(), collections::PATIENTS, &record)?;
                inserted += 1;
            }
        }

        let total_patients = self.store.count_documents(collections::PATIENTS, &Filter::all())?;
        let tx_reference = self
            .ledger
            .log_data_upload(&data_type.to_uppercase(), "File Upload", inserted as u64, &hospitals_in_file);
        info!(inserted, total_patients, "Upload stored");

        Ok(UploadSummary {
            new_patients: inserted,
            hospitals_in_file,
            total_patients,
            tx_reference,
        })
    }

    // ==================== SCREENING ====================

    pub fn list_trials(&self) -> ServiceResult<Vec<TrialSummary>> {
        let trials = self.load_trials()?;
        let population = self.load_patients()?;
        let counts = self.disease_counts()?;
        let summaries = {
            let mut rng = self.rng.lock();
            summarize_trials(&trials, &population, &counts, self.config.trial_sample_size, &mut *rng)
        };

        self.audit(
            AuditEvent::new(actions::TRIALS_VIEWED)
                .details(format!("Clinical trials accessed ({} trials listed)", summaries.len()))
                .record_count(summaries.len() as u64),
            self.config.audit_cooldown(),
        );
        Ok(summaries)
    }

    pub fn eligible_patients_for_drug(&self, request: &ScreeningRequest) -> ServiceResult<ScreeningResponse> {
        let trials = self.load_trials()?;
        let indication = resolve_indication(&trials, &request.drug_name);
        let population = self.load_patients()?;
        let params = build_params(&population, indication);
        let page = classify_and_paginate(&population, &params, request.tab, request.page, request.page_size);

        let drug = &request.drug_name;
        let mut event = AuditEvent::new(actions::ELIGIBILITY_SCREEN)
            .details(format!(
                "{}: {} eligible, {} not eligible out of {} patients",
                drug,
                page.eligible_count,
                page.not_eligible_count,
                population.len()
            ))
            .record_count(population.len() as u64)
            .with_meta("drug", drug.as_str())
            .with_meta("eligible", page.eligible_count as u64)
            .with_meta("not_eligible", page.not_eligible_count as u64);
        if let Some(hospital) = &request.hospital {
            event = event.actor(hospital.as_str());
        }
        let key = format!("{}_{}", actions::ELIGIBILITY_SCREEN, drug);
        self.audit_keyed(&key, event, self.config.audit_cooldown());

        Ok(ScreeningResponse {
            drug: drug.clone(),
            hospital: request.hospital.clone(),
            trial_params: params,
            privacy_mode: true,
            privacy_notice: PRIVACY_NOTICE,
            page,
        })
    }

    // ==================== EVENTS ====================

    pub fn login(&self, username: &str, hospital_name: &str) -> String {
        self.always(
            AuditEvent::new(actions::LOGIN)
                .details(format!("User '{}' logged in from {}", username, hospital_name))
                .actor(username),
        )
    }

    pub fn login_failed(&self, username: &str) -> Option<String> {
        self.audit(
            AuditEvent::new(actions::LOGIN_FAILED)
                .details(format!("Failed login attempt for user '{}'", username))
                .actor(username),
            self.config.login_failed_cooldown(),
        )
    }

    /// Frontend-initiated activity, throttled per action
    pub fn log_activity(&self, action: &str, details: &str, actor: Option<&str>) -> Option<String> {
        let mut event = AuditEvent::new(action).details(details);
        if let Some(actor) = actor {
            event = event.actor(actor);
        }
        self.audit(event, self.config.activity_cooldown())
    }

    pub fn dashboard_stats(&self) -> ServiceResult<DashboardStats> {
        let total_patients = self.store.count_documents(collections::PATIENTS, &Filter::all())?;
        let total_trials = self.load_trials()?.len();
        let unique_diseases = self.disease_counts()?.len();
        let training = self.training.status();

        self.audit(
            AuditEvent::new(actions::DASHBOARD_VIEWED)
                .details(format!(
                    "Dashboard stats accessed ({} patients, {} trials)",
                    total_patients, total_trials
                ))
                .record_count(total_patients),
            self.config.audit_cooldown(),
        );

        Ok(DashboardStats {
            total_patients,
            total_trials,
            unique_diseases,
            is_training: training.is_training,
            rounds_completed: training.rounds_completed,
            latest_accuracy: training
                .latest_metrics
                .map(|m| (m.accuracy * 1000.0).round() / 10.0),
        })
    }

    pub fn list_patients(&self, page: usize, page_size: usize, hospital: Option<&str>) -> ServiceResult<PatientPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PATIENT_PAGE_SIZE);
        let total = self.store.count_documents(collections::PATIENTS, &Filter::all())?;

        let mut event = AuditEvent::new(actions::PATIENTS_VIEWED)
            .details(format!("Patient records accessed (page {}, {} total)", page, total))
            .record_count(total);
        if let Some(hospital) = hospital {
            event = event.actor(hospital);
        }
        self.audit(event, self.config.audit_cooldown());

        let patients = self
            .load_patients()?
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Ok(PatientPage {
            patients,
            total,
            page,
            page_size,
            total_pages: (total as usize).div_ceil(page_size).max(1),
        })
    }

    /// Newest-first audit entries, capped at the configured listing limit
    pub fn audit_logs(&self, limit: Option<usize>) -> Vec<AuditLogEntry> {
        let limit = limit.unwrap_or(self.config.audit_log_limit).min(self.config.audit_log_limit);
        self.ledger.get_audit_logs(limit)
    }

    pub async fn training_logs(&self, from_index: u64, max_count: u64) -> Vec<TrainingLogView> {
        self.ledger.get_logs(from_index, max_count).await
    }

    // ==================== TRAINING ====================

    pub fn start_training(&self, num_rounds: u64) -> ServiceResult<()> {
        self.training.start(num_rounds)
    }

    pub fn stop_training(&self) -> bool {
        self.training.stop()
    }

    pub fn reset_training(&self) {
        self.training.reset()
    }

    pub fn training_status(&self) -> TrainingStatus {
        self.training.status()
    }

    // ==================== LIFECYCLE ====================

    pub fn health(&self) -> ServiceHealth {
        ServiceHealth {
            status: "healthy",
            ledger: self.ledger.health_check(),
            store_connected: self.store.ping(),
            training_active: self.training.is_active(),
        }
    }

    /// Stop training, drain the ledger queue within `timeout` and stop its worker
    pub async fn shutdown(&self, timeout: Duration) {
        self.training.stop();
        self.training.wait().await;
        if !self.ledger.flush(timeout).await {
            warn!("Ledger queue not drained before shutdown");
        }
        self.ledger.stop(timeout).await;
    }
}

impl std::fmt::Debug for ScreenerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenerService")
            .field("ledger", &self.ledger)
            .field("training", &self.training)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::training::SimulatedEvaluator;
    use crate::upload::JsonNormalizer;
    use screener_shared::{Comorbidities, InMemoryDocumentStore};

    fn patient(id: usize, disease: &str, age: u32) -> PatientRecord {
        PatientRecord {
            patient_id: Some(format!("P-{}", id)),
            patient_name: Some(format!("Patient {}", id)),
            age: Some(age),
            gender: Some(if id % 2 == 0 { "Male" } else { "Female" }.into()),
            disease: Some(disease.into()),
            comorbidities: Some(Comorbidities::List(vec!["Hypertension".into()])),
            bmi: Some(22.0 + (id % 10) as f64),
            ..PatientRecord::default()
        }
    }

    fn service() -> (Arc<InMemoryDocumentStore>, ScreenerService) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dyn_store = store.clone() as Arc<dyn DocumentStore>;
        let ledger = Arc::new(AuditLedger::mock(Some(dyn_store.clone()), 500));
        let svc = ScreenerService::new(
            ServiceConfig::default(),
            dyn_store,
            ledger,
            Arc::new(SimulatedEvaluator::seeded(3)),
        )
        .with_rng_seed(11);
        (store, svc)
    }

    fn actions_logged(svc: &ScreenerService, action: &str) -> usize {
        svc.audit_logs(None).iter().filter(|e| e.action == action).count()
    }

    #[test]
    fn test_startup_seeds_trials_once_and_logs() {
        let (store, svc) = service();
        store.seed(collections::PATIENTS, &[patient(1, "Cancer", 50)]).unwrap();

        assert_eq!(svc.startup(), 1);
        assert_eq!(svc.load_trials().unwrap().len(), 15);
        assert_eq!(svc.seed_default_trials().unwrap(), 0);
        svc.startup();
        assert_eq!(actions_logged(&svc, actions::SYSTEM_STARTUP), 2);
    }

    #[test]
    fn test_screening_response_and_throttle_per_drug() {
        let (store, svc) = service();
        svc.seed_default_trials().unwrap();
        let population: Vec<_> = (0..25).map(|i| patient(i, "Cancer", 40 + i as u32)).collect();
        store.seed(collections::PATIENTS, &population).unwrap();
        store.seed(collections::PATIENTS, &[patient(99, "Asthma", 90)]).unwrap();

        let mut request = ScreeningRequest::new("Oncoguard-7");
        request.hospital = Some("hospital_a".into());
        request.page_size = 10;
        let response = svc.eligible_patients_for_drug(&request).unwrap();

        assert_eq!(response.trial_params.age_range, [40, 64]);
        assert_eq!(response.page.eligible_count, 25);
        assert_eq!(response.page.not_eligible_count, 1);
        assert_eq!(response.page.total_pages, 3);
        assert_eq!(response.page.patients[0].patient_id, "ANON-00001");
        assert!(response.privacy_mode);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["tab"], "eligible");
        assert_eq!(json["privacy_notice"], PRIVACY_NOTICE);
        assert!(json["patients"][0].get("patient_name").is_none());

        svc.eligible_patients_for_drug(&request).unwrap();
        svc.eligible_patients_for_drug(&ScreeningRequest::new("Metformin-XL")).unwrap();
        let screens: Vec<AuditLogEntry> = svc
            .audit_logs(None)
            .into_iter()
            .filter(|e| e.action == actions::ELIGIBILITY_SCREEN)
            .collect();
        assert_eq!(screens.len(), 2);
        let onco = screens.iter().find(|e| e.metadata["drug"] == "Oncoguard-7").unwrap();
        assert_eq!(onco.details, "Oncoguard-7: 25 eligible, 1 not eligible out of 26 patients");
        assert_eq!(onco.actor, "hospital_a");
    }

    #[test]
    fn test_unknown_drug_screens_its_own_name() {
        let (store, svc) = service();
        store.seed(collections::PATIENTS, &[patient(1, "Lupus", 30)]).unwrap();
        let response = svc.eligible_patients_for_drug(&ScreeningRequest::new("Lupus")).unwrap();
        assert_eq!(response.trial_params.age_range, [30, 30]);
        assert_eq!(response.page.eligible_count, 1);
    }

    #[test]
    fn test_list_trials_estimates_and_throttles() {
        let (store, svc) = service();
        svc.seed_default_trials().unwrap();
        let population: Vec<_> = (0..12).map(|i| patient(i, "Diabetes", 30 + i as u32)).collect();
        store.seed(collections::PATIENTS, &population).unwrap();

        let trials = svc.list_trials().unwrap();
        assert_eq!(trials.len(), 15);
        let metformin = &trials[0];
        assert_eq!(metformin.patients_enrolled, 12);
        assert_eq!(metformin.eligible_from_current, 12);
        assert_eq!(trials[2].patients_enrolled, 0);

        svc.list_trials().unwrap();
        assert_eq!(actions_logged(&svc, actions::TRIALS_VIEWED), 1);
    }

    #[test]
    fn test_login_events() {
        let (_store, svc) = service();
        let reference = svc.login("hospital_a", "General Hospital");
        svc.login("hospital_a", "General Hospital");
        assert_eq!(reference.len(), 42);
        assert_eq!(actions_logged(&svc, actions::LOGIN), 2);

        assert!(svc.login_failed("mallory").is_some());
        assert!(svc.login_failed("mallory").is_none());
        let failed = svc.audit_logs(Some(10)).into_iter().find(|e| e.action == actions::LOGIN_FAILED).unwrap();
        assert_eq!(failed.details, "Failed login attempt for user 'mallory'");
    }

    #[test]
    fn test_activity_is_throttled_per_action() {
        let (_store, svc) = service();
        assert!(svc.log_activity("TAB_OPENED", "trials", Some("hospital_b")).is_some());
        assert!(svc.log_activity("TAB_OPENED", "patients", Some("hospital_b")).is_none());
        assert!(svc.log_activity("EXPORT", "csv", None).is_some());
    }

    #[test]
    fn test_upload_strips_fields_and_logs() {
        let (_store, svc) = service();
        let mut record = patient(1, "Cancer", 50);
        record.hospital = Some("hospital_a".into());
        record.extra.insert("drug_worked".into(), serde_json::json!(true));
        record.extra.insert("smoker".into(), serde_json::json!(false));

        let summary = svc
            .ingest_upload(
                "csv",
                vec![("hospital_a".into(), vec![record]), ("hospital_b".into(), vec![patient(2, "Asthma", 33)])],
            )
            .unwrap();
        assert_eq!(summary.new_patients, 2);
        assert_eq!(summary.total_patients, 2);
        assert_eq!(summary.hospitals_in_file, vec!["hospital_a", "hospital_b"]);

        let stored = svc.load_patients().unwrap();
        assert!(stored.iter().all(|p| p.hospital.is_none() && !p.has_field("drug_worked")));
        assert!(stored[0].has_field("smoker"));

        let upload = svc.audit_logs(Some(5)).into_iter().find(|e| e.action == actions::DATA_UPLOAD).unwrap();
        assert_eq!(
            upload.details,
            "CSV file uploaded from File Upload (2 records, hospitals: hospital_a, hospital_b)"
        );
        assert_eq!(upload.tx_hash, summary.tx_reference);
    }

    #[test]
    fn test_upload_file_through_normalizer() {
        let (_store, svc) = service();
        let raw = br#"[{"patient_id": "9", "hospital": "North", "eligible": true}, {"patient_id": "10"}]"#;

        let summary = svc.upload_file(&JsonNormalizer, raw, "ward.json", Some("South")).unwrap();
        assert_eq!(summary.new_patients, 2);
        assert_eq!(summary.hospitals_in_file, vec!["North", "South"]);
        assert!(svc.load_patients().unwrap().iter().all(|p| !p.has_field("eligible")));

        let upload = svc.audit_logs(Some(5)).into_iter().find(|e| e.action == actions::DATA_UPLOAD).unwrap();
        assert!(upload.details.starts_with("JSON file uploaded from File Upload"));

        let err = svc.upload_file(&JsonNormalizer, raw, "ward.xlsx", None).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
        assert_eq!(svc.load_patients().unwrap().len(), 2);
    }

    #[test]
    fn test_dashboard_and_patient_listing() {
        let (store, svc) = service();
        svc.seed_default_trials().unwrap();
        let population: Vec<_> = (0..7).map(|i| patient(i, if i < 4 { "Cancer" } else { "Stroke" }, 50)).collect();
        store.seed(collections::PATIENTS, &population).unwrap();

        let stats = svc.dashboard_stats().unwrap();
        assert_eq!(stats.total_patients, 7);
        assert_eq!(stats.total_trials, 15);
        assert_eq!(stats.unique_diseases, 2);
        assert_eq!(stats.latest_accuracy, None);

        let page = svc.list_patients(2, 5, Some("hospital_c")).unwrap();
        assert_eq!(page.patients.len(), 2);
        assert_eq!(page.total_pages, 2);
        let viewed = svc.audit_logs(None).into_iter().find(|e| e.action == actions::PATIENTS_VIEWED).unwrap();
        assert_eq!(viewed.details, "Patient records accessed (page 2, 7 total)");
        assert_eq!(viewed.actor, "hospital_c");
    }

    #[test]
    fn test_store_outage_surfaces_but_health_reports() {
        let (store, svc) = service();
        store.set_available(false);
        assert!(svc.list_trials().is_err());
        let health = svc.health();
        assert_eq!(health.status, "healthy");
        assert!(!health.store_connected);
        assert!(health.ledger.is_mock);
        assert!(!health.training_active);
    }

    #[test]
    fn test_audit_listing_is_capped() {
        let (_store, svc) = service();
        for n in 0..5 {
            svc.login(&format!("user{}", n), "General Hospital");
        }
        assert_eq!(svc.audit_logs(Some(3)).len(), 3);
        assert_eq!(svc.audit_logs(Some(10_000)).len(), 5);
    }

    #[tokio::test]
    async fn test_connect_without_transport_falls_back() {
        let store = Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>;
        let svc = ScreenerService::connect(ServiceConfig::default(), store, None, Arc::new(SimulatedEvaluator::seeded(1)))
            .await
            .unwrap();
        assert!(svc.ledger().is_mock());
    }

    #[tokio::test]
    async fn test_connect_strict_propagates() {
        let store = Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>;
        let mut config = ServiceConfig::default();
        config.ledger.strict = true;
        let result = ScreenerService::connect(config, store, None, Arc::new(SimulatedEvaluator::seeded(1))).await;
        assert!(matches!(result, Err(crate::error::ServiceError::Ledger(_))));
    }
}
