//! Persisted record shapes.
//!
//! Field names on the wire (`txHash`, `drugName`, `successRate`, …) are the
//! compatibility contract with existing collections and must not change.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Collection names in the document store
pub mod collections {
    pub const PATIENTS: &str = "patients";
    pub const TRIALS: &str = "trials";
    pub const AUDIT_LOGS: &str = "audit_logs";
    pub const TRAINING_LOGS: &str = "training_logs";
}

// ==================== PATIENTS ====================

/// Comorbidities as uploaded: either a token list or free text.
///
/// Only the list form contributes to comorbidity frequency counts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Comorbidities {
    List(Vec<String>),
    Text(String),
}

impl Comorbidities {
    /// Tokens usable for frequency counting
    pub fn tokens(&self) -> &[String] {
        match self {
            Comorbidities::List(tokens) => tokens,
            Comorbidities::Text(_) => &[],
        }
    }
}

/// A normalized patient record as stored in the `patients` collection
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital: Option<String>,
    /// Any other uploaded columns, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PatientRecord {
    pub fn gender(&self) -> Option<&str> {
        non_empty(&self.gender)
    }

    pub fn blood_group(&self) -> Option<&str> {
        non_empty(&self.blood_group)
    }

    pub fn disease(&self) -> Option<&str> {
        non_empty(&self.disease)
    }

    pub fn stage(&self) -> Option<&str> {
        non_empty(&self.stage)
    }

    /// Whether the record carries a value for the named column
    pub fn has_field(&self, column: &str) -> bool {
        match column {
            "patient_id" => self.patient_id.is_some(),
            "patient_name" => self.patient_name.is_some(),
            "age" => self.age.is_some(),
            "gender" => self.gender.is_some(),
            "phone" => self.phone.is_some(),
            "email" => self.email.is_some(),
            "address" => self.address.is_some(),
            "blood_group" => self.blood_group.is_some(),
            "disease" => self.disease.is_some(),
            "stage" => self.stage.is_some(),
            "comorbidities" => self.comorbidities.is_some(),
            "bmi" => self.bmi.is_some(),
            "diagnosis_date" => self.diagnosis_date.is_some(),
            "admission_date" => self.admission_date.is_some(),
            "emergency_contact" => self.emergency_contact.is_some(),
            "hospital" => self.hospital.is_some(),
            other => self.extra.contains_key(other),
        }
    }
}

/// Empty strings count as absent
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Ages arrive as integers, whole floats (`45.0`) or null depending on the
/// upload source. Fractional or negative numbers are treated as missing.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    })
}

// ==================== TRIALS ====================

fn default_phase() -> String {
    "Phase III".to_string()
}

fn default_status() -> String {
    "Active".to_string()
}

/// A trial definition from the `trials` collection
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrialDefinition {
    #[serde(rename = "drugName")]
    pub drug_name: String,
    pub indication: String,
    #[serde(default = "default_phase")]
    pub phase: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(rename = "successRate", default)]
    pub success_rate: f64,
}

// ==================== AUDIT ====================

/// An entry of the append-only audit trail (`audit_logs` collection)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub action: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub record_count: u64,
    pub timestamp: i64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(rename = "txHash", default)]
    pub tx_hash: String,
}

// ==================== TRAINING ====================

/// One completed federated-training round
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingRoundRecord {
    pub round_number: u64,
    pub accuracy: f64,
    #[serde(default)]
    pub loss: Option<f64>,
    /// Content identifier of the model state, not the state itself
    pub model_hash: String,
    pub timestamp: i64,
}

/// Stored shape of a committed training round (`training_logs` collection)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingLogDocument {
    pub round: u64,
    pub accuracy: f64,
    pub loss: Option<f64>,
    pub timestamp: i64,
    pub model_hash: String,
    #[serde(rename = "txHash", default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl TrainingLogDocument {
    pub fn from_round(record: &TrainingRoundRecord, tx_hash: Option<String>) -> Self {
        Self {
            round: record.round_number,
            accuracy: record.accuracy,
            loss: record.loss,
            timestamp: record.timestamp,
            model_hash: record.model_hash.clone(),
            tx_hash,
        }
    }
}
