//! Trial catalogue and eligible-count estimates.

use rand::seq::SliceRandom;
use rand::Rng;
use screener_shared::{PatientRecord, TrialDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::classify::count_eligible;
use crate::params::{build_params, TrialEligibilityParams};

/// Patients screened per trial when estimating eligible counts
pub const DEFAULT_SAMPLE_SIZE: usize = 2000;

const CATALOGUE: [(&str, &str, &str, &str, f64); 15] = [
    ("Metformin-XL", "Diabetes", "Phase III", "Active", 72.4),
    ("Cardiozen-B", "Heart Disease", "Phase III", "Active", 65.8),
    ("Oncoguard-7", "Cancer", "Phase II", "Active", 48.2),
    ("Pneumofix-R", "Pneumonia", "Phase III", "Active", 81.3),
    ("Nephrostat-C", "Kidney Disease", "Phase II", "Active", 59.7),
    ("Hepatocure-D", "Liver Disease", "Phase III", "Active", 63.1),
    ("NeuroShield-X", "Stroke", "Phase II", "Active", 55.9),
    ("Arthroven-P", "Arthritis", "Phase III", "Active", 70.2),
    ("Pulmoclear-S", "Asthma", "Phase III", "Completed", 76.5),
    ("HyperNorm-T", "Hypertension", "Phase III", "Active", 68.9),
    ("ThyroBalance-F", "Thyroid Disorder", "Phase II", "Active", 61.4),
    ("Bortezomib", "Multiple Myeloma", "Phase III", "Active", 52.0),
    ("Anemiron-G", "Anemia", "Phase III", "Active", 74.1),
    ("DermaHeal-V", "Skin Disease", "Phase II", "Active", 66.3),
    ("GastroEase-M", "Gastrointestinal", "Phase III", "Active", 71.0),
];

/// Catalogue used to seed an empty `trials` collection
pub fn default_trials() -> Vec<TrialDefinition> {
    CATALOGUE
        .iter()
        .map(|(drug, indication, phase, status, rate)| TrialDefinition {
            drug_name: drug.to_string(),
            indication: indication.to_string(),
            phase: phase.to_string(),
            status: status.to_string(),
            success_rate: *rate,
        })
        .collect()
}

/// Indication screened for `drug_name`; unknown drugs screen for themselves
pub fn resolve_indication<'a>(trials: &'a [TrialDefinition], drug_name: &'a str) -> &'a str {
    trials
        .iter()
        .find(|t| t.drug_name == drug_name)
        .map(|t| t.indication.as_str())
        .unwrap_or(drug_name)
}

/// One row of the trial listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialSummary {
    pub id: usize,
    pub drug_name: String,
    pub indication: String,
    pub phase: String,
    pub status: String,
    pub patients_enrolled: u64,
    pub success_rate: f64,
    pub eligibility_params: TrialEligibilityParams,
    pub eligible_from_current: u64,
}

/// Uniform sample without replacement, or everything when small enough
pub fn sample_population<'a, R: Rng + ?Sized>(
    population: &'a [PatientRecord],
    sample_size: usize,
    rng: &mut R,
) -> Vec<&'a PatientRecord> {
    if population.len() > sample_size {
        population.choose_multiple(rng, sample_size).collect()
    } else {
        population.iter().collect()
    }
}

/// Scale a sample's eligible count up to the full population
pub fn extrapolate(sample_eligible: usize, sample_len: usize, total: usize) -> u64 {
    if sample_len == 0 {
        return 0;
    }
    (sample_eligible as f64 * total as f64 / sample_len as f64).round() as u64
}

/// Build the listing for every trial.
///
/// Parameters come from the whole population; eligible counts are estimated
/// from one shared sample. `disease_counts` supplies `patientsEnrolled`.
pub fn summarize_trials<R: Rng + ?Sized>(
    trials: &[TrialDefinition],
    population: &[PatientRecord],
    disease_counts: &HashMap<String, u64>,
    sample_size: usize,
    rng: &mut R,
) -> Vec<TrialSummary> {
    let sample = sample_population(population, sample_size, rng);

    trials
        .iter()
        .enumerate()
        .map(|(idx, trial)| {
            let params = build_params(population, &trial.indication);
            let eligible = count_eligible(sample.iter().copied(), &params);
            TrialSummary {
                id: idx + 1,
                drug_name: trial.drug_name.clone(),
                indication: trial.indication.clone(),
                phase: trial.phase.clone(),
                status: trial.status.clone(),
                patients_enrolled: disease_counts.get(&trial.indication).copied().unwrap_or(0),
                success_rate: trial.success_rate,
                eligibility_params: params,
                eligible_from_current: extrapolate(eligible, sample.len(), population.len()),
            }
        })
        .collect()
}
