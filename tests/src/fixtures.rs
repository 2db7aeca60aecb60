//! Shared builders for the scenario suites.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use screener_audit::ledger::{SimulatedChain, KNOWN_INTERFACES};
use screener_audit::{AuditLedger, ChainRpc, LedgerConfig};
use screener_shared::{Comorbidities, DocumentStore, InMemoryDocumentStore, PatientRecord, TrainingRoundRecord};
use std::sync::Arc;

pub const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

const DISEASES: [&str; 6] = ["Diabetes", "Cancer", "Stroke", "Asthma", "Anemia", "Hypertension"];
const GENDERS: [&str; 3] = ["Male", "Female", ""];
const BLOOD_GROUPS: [&str; 5] = ["A+", "B+", "O+", "AB-", ""];
const STAGES: [&str; 4] = ["I", "II", "III", "IV"];
const COMORBIDITIES: [&str; 6] = ["Hypertension", "Obesity", "CKD", "Asthma", "Anemia", "COPD"];

/// Deterministic synthetic population with realistic gaps.
///
/// Age and BMI bands shift with the disease so envelopes differ per indication.
pub fn population(size: usize, seed: u64) -> Vec<PatientRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|i| {
            let disease = rng.gen_range(0..DISEASES.len());
            let age_floor = 10 + 8 * disease as u32;
            let bmi_floor = 16.0 + 2.5 * disease as f64;
            let comorbidity_count = rng.gen_range(0..3);
            PatientRecord {
                patient_id: Some(format!("P-{:06}", i)),
                patient_name: Some(format!("Patient {}", i)),
                age: rng.gen_bool(0.95).then(|| rng.gen_range(age_floor..age_floor + 35)),
                gender: Some(GENDERS[rng.gen_range(0..GENDERS.len())].to_string()),
                blood_group: Some(BLOOD_GROUPS[rng.gen_range(0..BLOOD_GROUPS.len())].to_string()),
                disease: Some(DISEASES[disease].to_string()),
                stage: rng.gen_bool(0.7).then(|| STAGES[rng.gen_range(0..STAGES.len())].to_string()),
                comorbidities: Some(Comorbidities::List(
                    (0..comorbidity_count)
                        .map(|_| COMORBIDITIES[rng.gen_range(0..COMORBIDITIES.len())].to_string())
                        .collect(),
                )),
                bmi: rng.gen_bool(0.9).then(|| rng.gen_range(bmi_floor..bmi_floor + 12.0)),
                diagnosis_date: Some("2024-03-01".to_string()),
                ..PatientRecord::default()
            }
        })
        .collect()
}

pub fn round(round_number: u64, accuracy: f64) -> TrainingRoundRecord {
    TrainingRoundRecord {
        round_number,
        accuracy,
        loss: Some(0.25),
        model_hash: format!("model_r{}_0123456789abcdef", round_number),
        timestamp: 1_700_000_000 + round_number as i64,
    }
}

/// Ledger settings tuned for fast simulated delivery
pub fn chain_config() -> LedgerConfig {
    LedgerConfig {
        contract_address: Some(CONTRACT.to_string()),
        worker_poll_ms: 20,
        backoff_base_ms: 10,
        receipt_timeout_secs: 1,
        ..LedgerConfig::default()
    }
}

pub fn store() -> (Arc<InMemoryDocumentStore>, Arc<dyn DocumentStore>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let shared = store.clone() as Arc<dyn DocumentStore>;
    (store, shared)
}

pub fn chain() -> Arc<SimulatedChain> {
    Arc::new(SimulatedChain::new(KNOWN_INTERFACES[0]))
}

/// Chain-backed ledger over `chain`, worker already running
pub async fn chain_ledger(
    config: &LedgerConfig,
    chain: &Arc<SimulatedChain>,
    store: Arc<dyn DocumentStore>,
) -> AuditLedger {
    let rpc = chain.clone() as Arc<dyn ChainRpc>;
    let ledger = AuditLedger::connect_or_fallback(config, Some(rpc), Some(store))
        .await
        .expect("simulated chain connects");
    assert!(!ledger.is_mock());
    ledger
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_is_deterministic() {
        assert_eq!(population(50, 9), population(50, 9));
        assert_ne!(population(50, 9), population(50, 10));
    }
}
