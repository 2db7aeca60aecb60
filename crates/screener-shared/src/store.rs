//! Document Store Contract
//!
//! Patients, trials and the audit trail live in a document database that the
//! screener treats as an external collaborator. Only four operations are
//! consumed: `insert_one`, `find`, `aggregate` and `count_documents`, plus a
//! cheap `ping` for health reporting.
//!
//! [`InMemoryDocumentStore`] implements the contract for tests, the CLI and
//! deployments without a database. It can be switched unavailable to exercise
//! outage paths.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use thiserror::Error;

/// A stored document
pub type Document = Map<String, Value>;

/// Errors raised by a document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record did not serialize to a document object")]
    NotAnObject,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Equality filter over top-level fields; an empty filter matches everything
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(field, value)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field).unwrap_or(&Value::Null) == expected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Options for [`DocumentStore::find`]
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    /// Keep only these fields (all fields when `None`)
    pub projection: Option<Vec<String>>,
    pub sort: Option<(String, SortDirection)>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            sort: Some((field.into(), direction)),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_projection(mut self, fields: &[&str]) -> Self {
        self.projection = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// One stage of an aggregation pipeline
#[derive(Clone, Debug)]
pub enum Stage {
    Match(Filter),
    /// Emits `{"_id": <value>, "count": <n>}` per distinct value of `by`
    GroupCount { by: String },
    Sort { field: String, direction: SortDirection },
    Limit(usize),
}

/// Contract of the backing document database
pub trait DocumentStore: Send + Sync {
    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()>;

    fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>>;

    fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>>;

    fn count_documents(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Whether the store currently answers requests
    fn ping(&self) -> bool;
}

/// Serialize a record and insert it
pub fn insert_record<T: Serialize>(store: &dyn DocumentStore, collection: &str, record: &T) -> StoreResult<()> {
    match serde_json::to_value(record)? {
        Value::Object(document) => store.insert_one(collection, document),
        _ => Err(StoreError::NotAnObject),
    }
}

/// Find documents and deserialize them into records
pub fn find_records<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &Filter,
    options: &FindOptions,
) -> StoreResult<Vec<T>> {
    store
        .find(collection, filter, options)?
        .into_iter()
        .map(|document| serde_json::from_value(Value::Object(document)).map_err(StoreError::from))
        .collect()
}

/// Count documents per distinct non-empty value of `field`
pub fn count_by_field(store: &dyn DocumentStore, collection: &str, field: &str) -> StoreResult<HashMap<String, u64>> {
    let grouped = store.aggregate(collection, &[Stage::GroupCount { by: field.to_string() }])?;
    Ok(grouped
        .into_iter()
        .filter_map(|doc| {
            let key = doc.get("_id").and_then(Value::as_str).filter(|k| !k.is_empty())?.to_string();
            let count = doc.get("count").and_then(Value::as_u64)?;
            Some((key, count))
        })
        .collect())
}

/// Total ordering over JSON values used for sorting: null < bool < number < string < other
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn sort_documents(documents: &mut [Document], field: &str, direction: SortDirection) {
    documents.sort_by(|a, b| {
        let ordering = compare_values(
            a.get(field).unwrap_or(&Value::Null),
            b.get(field).unwrap_or(&Value::Null),
        );
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

fn project(document: &Document, fields: &[String]) -> Document {
    fields
        .iter()
        .filter_map(|field| document.get(field).map(|v| (field.clone(), v.clone())))
        .collect()
}

/// Thread-safe in-memory document store
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    unavailable: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, AtomicOrdering::SeqCst);
    }

    /// Bulk-load serializable records into a collection
    pub fn seed<T: Serialize>(&self, collection: &str, records: &[T]) -> StoreResult<usize> {
        for record in records {
            insert_record(self, collection, record)?;
        }
        Ok(records.len())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<()> {
        self.check_available()?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    fn find(&self, collection: &str, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        self.check_available()?;
        let mut matched: Vec<Document> = {
            let collections = self.collections.read();
            collections
                .get(collection)
                .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
                .unwrap_or_default()
        };

        if let Some((field, direction)) = &options.sort {
            sort_documents(&mut matched, field, *direction);
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        if let Some(fields) = &options.projection {
            matched = matched.iter().map(|d| project(d, fields)).collect();
        }
        Ok(matched)
    }

    fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Document>> {
        let mut documents = self.find(collection, &Filter::all(), &FindOptions::default())?;

        for stage in pipeline {
            match stage {
                Stage::Match(filter) => documents.retain(|d| filter.matches(d)),
                Stage::GroupCount { by } => {
                    // Groups keep first-seen order
                    let mut order: Vec<Value> = Vec::new();
                    let mut counts: HashMap<String, u64> = HashMap::new();
                    for doc in &documents {
                        let key = doc.get(by).cloned().unwrap_or(Value::Null);
                        let slot = key.to_string();
                        let count = counts.entry(slot).or_insert(0);
                        if *count == 0 {
                            order.push(key);
                        }
                        *count += 1;
                    }
                    documents = order
                        .into_iter()
                        .map(|key| {
                            let count = counts.get(&key.to_string()).copied().unwrap_or(0);
                            let mut group = Document::new();
                            group.insert("_id".to_string(), key);
                            group.insert("count".to_string(), Value::from(count));
                            group
                        })
                        .collect();
                }
                Stage::Sort { field, direction } => sort_documents(&mut documents, field, *direction),
                Stage::Limit(limit) => documents.truncate(*limit),
            }
        }

        Ok(documents)
    }

    fn count_documents(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.check_available()?;
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.check_available()?;
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        Ok((before - docs.len()) as u64)
    }

    fn ping(&self) -> bool {
        !self.unavailable.load(AtomicOrdering::SeqCst)
    }
}
