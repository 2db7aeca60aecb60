//! Eligibility parameter builder.
//!
//! A trial's admission envelope is derived from the patients currently on
//! file for its indication: the observed age and BMI ranges, the genders,
//! blood groups and stages seen, and the most frequent comorbidities.

use screener_shared::PatientRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const DEFAULT_AGE_RANGE: [u32; 2] = [18, 85];
pub const DEFAULT_BMI_RANGE: [f64; 2] = [15.0, 40.0];
pub const DEFAULT_GENDERS: [&str; 2] = ["Male", "Female"];
pub const TOP_COMORBIDITIES: usize = 5;

/// Admission envelope for one indication
///
/// Empty `blood_groups` or `stages` mean unrestricted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialEligibilityParams {
    pub age_range: [u32; 2],
    pub genders: Vec<String>,
    pub blood_groups: Vec<String>,
    pub bmi_range: [f64; 2],
    pub stages: Vec<String>,
    pub common_comorbidities: Vec<String>,
}

impl Default for TrialEligibilityParams {
    fn default() -> Self {
        Self {
            age_range: DEFAULT_AGE_RANGE,
            genders: DEFAULT_GENDERS.iter().map(|g| g.to_string()).collect(),
            blood_groups: Vec::new(),
            bmi_range: DEFAULT_BMI_RANGE,
            stages: Vec::new(),
            common_comorbidities: Vec::new(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Frequency counter that remembers first-seen order for tie breaking
#[derive(Default)]
struct TokenCounts {
    order: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl TokenCounts {
    fn add(&mut self, token: &str) {
        match self.index.get(token) {
            Some(&slot) => self.order[slot].1 += 1,
            None => {
                self.index.insert(token.to_string(), self.order.len());
                self.order.push((token.to_string(), 1));
            }
        }
    }

    fn top(mut self, n: usize) -> Vec<String> {
        // sort_by is stable, so equal counts keep first-seen order
        self.order.sort_by(|a, b| b.1.cmp(&a.1));
        self.order.into_iter().take(n).map(|(token, _)| token).collect()
    }
}

/// Derive the envelope for `disease` in a single pass over `population`
pub fn build_params(population: &[PatientRecord], disease: &str) -> TrialEligibilityParams {
    let mut age: Option<(u32, u32)> = None;
    let mut bmi: Option<(f64, f64)> = None;
    let mut genders = BTreeSet::new();
    let mut blood_groups = BTreeSet::new();
    let mut stages = BTreeSet::new();
    let mut comorbidities = TokenCounts::default();

    for patient in population {
        if patient.disease.as_deref().unwrap_or("") != disease {
            continue;
        }
        if let Some(a) = patient.age {
            age = Some(age.map_or((a, a), |(lo, hi)| (lo.min(a), hi.max(a))));
        }
        if let Some(b) = patient.bmi.filter(|b| b.is_finite()) {
            bmi = Some(bmi.map_or((b, b), |(lo, hi)| (lo.min(b), hi.max(b))));
        }
        if let Some(g) = patient.gender() {
            genders.insert(g.to_string());
        }
        if let Some(bg) = patient.blood_group() {
            blood_groups.insert(bg.to_string());
        }
        if let Some(s) = patient.stage() {
            stages.insert(s.to_string());
        }
        if let Some(c) = &patient.comorbidities {
            for token in c.tokens() {
                comorbidities.add(token);
            }
        }
    }

    let defaults = TrialEligibilityParams::default();
    TrialEligibilityParams {
        age_range: age.map_or(defaults.age_range, |(lo, hi)| [lo, hi]),
        genders: if genders.is_empty() {
            defaults.genders
        } else {
            genders.into_iter().collect()
        },
        blood_groups: blood_groups.into_iter().collect(),
        bmi_range: bmi.map_or(defaults.bmi_range, |(lo, hi)| [round1(lo), round1(hi)]),
        stages: stages.into_iter().collect(),
        common_comorbidities: comorbidities.top(TOP_COMORBIDITIES),
    }
}
