//! Upload normalization seam.
//!
//! A normalizer turns raw file bytes into patient records grouped by
//! hospital. The service only stores what a normalizer hands back.

use screener_shared::PatientRecord;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ServiceError, ServiceResult};

/// Hospital name and the records uploaded for it, in file order
pub type UploadGroups = Vec<(String, Vec<PatientRecord>)>;

pub const DEFAULT_UPLOAD_GROUP: &str = "Unknown Hospital";

const ACCEPTED_EXTENSIONS: [&str; 3] = ["csv", "json", "pdf"];

pub trait UploadNormalizer: Send + Sync {
    fn normalize(&self, raw: &[u8], filename: &str, default_group: &str) -> ServiceResult<UploadGroups>;
}

/// Upper-cased extension of an accepted upload, e.g. `JSON`
pub fn upload_data_type(filename: &str) -> ServiceResult<String> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ServiceError::invalid("Unsupported file type. Upload CSV, JSON, or PDF."));
    }
    Ok(extension.to_uppercase())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonUpload {
    Grouped { hospitals: BTreeMap<String, Vec<PatientRecord>> },
    Flat(Vec<PatientRecord>),
}

/// Accepts a JSON array of records, or `{"hospitals": {name: [records]}}`.
///
/// Flat records are grouped by their `hospital` field, falling back to the
/// default group.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonNormalizer;

impl UploadNormalizer for JsonNormalizer {
    fn normalize(&self, raw: &[u8], filename: &str, default_group: &str) -> ServiceResult<UploadGroups> {
        let upload: JsonUpload = serde_json::from_slice(raw)
            .map_err(|e| ServiceError::invalid(format!("{} is not a patient upload: {}", filename, e)))?;

        match upload {
            JsonUpload::Grouped { hospitals } => Ok(hospitals.into_iter().collect()),
            JsonUpload::Flat(records) => {
                let mut groups: UploadGroups = Vec::new();
                for record in records {
                    let hospital = record
                        .hospital
                        .as_deref()
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .unwrap_or(default_group)
                        .to_string();
                    match groups.iter_mut().find(|(name, _)| *name == hospital) {
                        Some((_, members)) => members.push(record),
                        None => groups.push((hospital, vec![record])),
                    }
                }
                Ok(groups)
            }
        }
    }
}
