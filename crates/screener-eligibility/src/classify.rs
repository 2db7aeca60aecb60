//! Per-patient eligibility check against a [`TrialEligibilityParams`] envelope.

use screener_shared::PatientRecord;

use crate::params::TrialEligibilityParams;

fn admits(allowed: &[String], value: Option<&str>) -> bool {
    match value {
        Some(v) if !allowed.is_empty() => allowed.iter().any(|a| a == v),
        _ => true,
    }
}

/// Whether `patient` falls inside the envelope.
///
/// Missing patient fields are not held against the patient, and an empty
/// restriction set admits everyone. Checks run age, gender, blood group,
/// BMI, stage and stop at the first failure.
pub fn is_eligible(patient: &PatientRecord, params: &TrialEligibilityParams) -> bool {
    if let Some(age) = patient.age {
        if age < params.age_range[0] || age > params.age_range[1] {
            return false;
        }
    }
    if !admits(&params.genders, patient.gender()) {
        return false;
    }
    if !admits(&params.blood_groups, patient.blood_group()) {
        return false;
    }
    if let Some(bmi) = patient.bmi {
        if bmi < params.bmi_range[0] || bmi > params.bmi_range[1] {
            return false;
        }
    }
    admits(&params.stages, patient.stage())
}

/// Indices of eligible and not-eligible patients, each in input order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub eligible: Vec<usize>,
    pub not_eligible: Vec<usize>,
}

impl Partition {
    pub fn total(&self) -> usize {
        self.eligible.len() + self.not_eligible.len()
    }
}

pub fn partition(population: &[PatientRecord], params: &TrialEligibilityParams) -> Partition {
    let mut out = Partition::default();
    for (idx, patient) in population.iter().enumerate() {
        if is_eligible(patient, params) {
            out.eligible.push(idx);
        } else {
            out.not_eligible.push(idx);
        }
    }
    out
}

/// Count of eligible patients without materializing the partition
pub fn count_eligible<'a, I>(population: I, params: &TrialEligibilityParams) -> usize
where
    I: IntoIterator<Item = &'a PatientRecord>,
{
    population.into_iter().filter(|p| is_eligible(p, params)).count()
}
