//! Tabbed, paginated, anonymized screening results.

use screener_shared::{Comorbidities, PatientRecord};
use serde::{Deserialize, Serialize};

use crate::classify::partition;
use crate::params::TrialEligibilityParams;

pub const MIN_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Columns a screening page may expose
pub const PRIVACY_SAFE_COLUMNS: [&str; 9] = [
    "patient_id",
    "age",
    "gender",
    "blood_group",
    "disease",
    "stage",
    "comorbidities",
    "bmi",
    "diagnosis_date",
];

/// Rows sampled when reporting which columns a page carries
const COLUMN_PROBE_ROWS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Eligible,
    NotEligible,
}

impl Tab {
    /// `"eligible"` selects the eligible tab, anything else the other one
    pub fn parse(raw: &str) -> Self {
        if raw == "eligible" {
            Tab::Eligible
        } else {
            Tab::NotEligible
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Eligible => "eligible",
            Tab::NotEligible => "not_eligible",
        }
    }
}

/// A patient row projected onto [`PRIVACY_SAFE_COLUMNS`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FederatedPatientRow {
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comorbidities: Option<Comorbidities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_date: Option<String>,
}

impl FederatedPatientRow {
    /// Project `patient`, replacing its identifier with the anonymous one
    pub fn anonymize(patient: &PatientRecord, absolute_index: usize) -> Self {
        Self {
            patient_id: anonymous_id(absolute_index),
            age: patient.age,
            gender: patient.gender.clone(),
            blood_group: patient.blood_group.clone(),
            disease: patient.disease.clone(),
            stage: patient.stage.clone(),
            comorbidities: patient.comorbidities.clone(),
            bmi: patient.bmi,
            diagnosis_date: patient.diagnosis_date.clone(),
        }
    }
}

/// `ANON-00001` style identifier for a 1-based position within a tab
pub fn anonymous_id(absolute_index: usize) -> String {
    format!("ANON-{:05}", absolute_index)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub tab: Tab,
    pub patients: Vec<FederatedPatientRow>,
    pub columns: Vec<String>,
    pub eligible_count: usize,
    pub not_eligible_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

pub fn total_pages(rows: usize, page_size: usize) -> usize {
    rows.div_ceil(page_size.max(1)).max(1)
}

/// Partition `population`, pick `tab` and return one anonymized page of it.
///
/// `page_size` is clamped to `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]` and `page` to at
/// least 1. A page past the end comes back empty with the counts intact.
pub fn classify_and_paginate(
    population: &[PatientRecord],
    params: &TrialEligibilityParams,
    tab: Tab,
    page: usize,
    page_size: usize,
) -> PageResult {
    let page = page.max(1);
    let page_size = clamp_page_size(page_size);
    let split = partition(population, params);

    let selected = match tab {
        Tab::Eligible => &split.eligible,
        Tab::NotEligible => &split.not_eligible,
    };

    let start = (page - 1).saturating_mul(page_size);
    let raw: Vec<&PatientRecord> = selected
        .iter()
        .skip(start)
        .take(page_size)
        .map(|&idx| &population[idx])
        .collect();

    let patients = raw
        .iter()
        .enumerate()
        .map(|(offset, patient)| FederatedPatientRow::anonymize(patient, start + offset + 1))
        .collect();

    PageResult {
        tab,
        patients,
        columns: page_columns(&raw),
        eligible_count: split.eligible.len(),
        not_eligible_count: split.not_eligible.len(),
        page,
        page_size,
        total_pages: total_pages(selected.len(), page_size),
    }
}

fn page_columns(raw: &[&PatientRecord]) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    let probe = &raw[..raw.len().min(COLUMN_PROBE_ROWS)];
    PRIVACY_SAFE_COLUMNS
        .iter()
        .filter(|col| **col == "patient_id" || probe.iter().any(|p| p.has_field(col)))
        .map(|col| col.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params() -> TrialEligibilityParams {
        TrialEligibilityParams {
            age_range: [18, 65],
            ..TrialEligibilityParams::default()
        }
    }

    fn population(eligible: usize, not_eligible: usize) -> Vec<PatientRecord> {
        let mut out = Vec::new();
        for i in 0..eligible.max(not_eligible) {
            if i < eligible {
                out.push(PatientRecord {
                    patient_id: Some(format!("REAL-{}", i)),
                    patient_name: Some("Jane Roe".into()),
                    age: Some(40),
                    ..PatientRecord::default()
                });
            }
            if i < not_eligible {
                out.push(PatientRecord {
                    age: Some(90),
                    ..PatientRecord::default()
                });
            }
        }
        out
    }

    #[test]
    fn test_tab_parse() {
        assert_eq!(Tab::parse("eligible"), Tab::Eligible);
        assert_eq!(Tab::parse("not_eligible"), Tab::NotEligible);
        assert_eq!(Tab::parse("anything"), Tab::NotEligible);
        assert_eq!(serde_json::to_value(Tab::NotEligible).unwrap(), "not_eligible");
    }

    #[test]
    fn test_rows_are_anonymized_and_projected() {
        let result = classify_and_paginate(&population(3, 0), &params(), Tab::Eligible, 1, 10);
        assert_eq!(result.patients.len(), 3);
        assert_eq!(result.patients[0].patient_id, "ANON-00001");
        assert_eq!(result.patients[2].patient_id, "ANON-00003");

        let json = serde_json::to_value(&result.patients[0]).unwrap();
        assert!(json.get("patient_name").is_none());
        assert_eq!(json["patient_id"], "ANON-00001");
        assert_eq!(result.columns, vec!["patient_id", "age"]);
    }

    #[test]
    fn test_page_size_and_page_are_clamped() {
        let pop = population(30, 0);
        let small = classify_and_paginate(&pop, &params(), Tab::Eligible, 0, 1);
        assert_eq!(small.page, 1);
        assert_eq!(small.page_size, MIN_PAGE_SIZE);
        assert_eq!(small.total_pages, 3);

        let big = classify_and_paginate(&pop, &params(), Tab::Eligible, 1, 10_000);
        assert_eq!(big.page_size, MAX_PAGE_SIZE);
        assert_eq!(big.patients.len(), 30);
    }

    #[test]
    fn test_empty_tab_has_one_page() {
        let result = classify_and_paginate(&population(4, 0), &params(), Tab::NotEligible, 1, 10);
        assert_eq!(result.total_pages, 1);
        assert!(result.patients.is_empty());
        assert!(result.columns.is_empty());
        assert_eq!(result.eligible_count, 4);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let result = classify_and_paginate(&population(15, 0), &params(), Tab::Eligible, 5, 10);
        assert!(result.patients.is_empty());
        assert_eq!(result.total_pages, 2);
    }

    proptest! {
        #[test]
        fn prop_pagination_arithmetic(
            eligible in 0usize..450,
            not_eligible in 0usize..50,
            page_size in 10usize..=200,
            page_seed in 0usize..1000,
        ) {
            let pop = population(eligible, not_eligible);
            let pages = total_pages(eligible, page_size);
            let page = page_seed % pages + 1;
            let result = classify_and_paginate(&pop, &params(), Tab::Eligible, page, page_size);

            prop_assert_eq!(result.eligible_count + result.not_eligible_count, pop.len());
            prop_assert_eq!(result.total_pages, pages);
            if page == pages {
                prop_assert_eq!(result.patients.len(), eligible - (pages - 1) * page_size);
            } else {
                prop_assert_eq!(result.patients.len(), page_size);
            }
            if let Some(first) = result.patients.first() {
                prop_assert_eq!(&first.patient_id, &anonymous_id((page - 1) * page_size + 1));
            }
        }
    }
}
