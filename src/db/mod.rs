//! Document store collaborator.
//!
//! Every record lives as one JSON document inside a named collection. Writes are
//! last-writer-wins per document; `update` merges top-level fields only.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::StoreConfig;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const PATIENTS: &str = "patients";
pub const VITALS: &str = "vitals";
pub const PRESCRIPTIONS: &str = "prescriptions";
pub const LAB_ORDERS: &str = "labOrders";
pub const SURGERIES: &str = "surgeries";
pub const MEDICATIONS: &str = "medications";

/// Top-level fields of a document.
pub type Record = Map<String, Value>;

/// Live feed of full collection snapshots.
pub type DocumentStream = BoxStream<'static, Vec<Document>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("document encoding error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document {id} does not exist in {collection}")]
    MissingDocument { collection: String, id: String },
    #[error("unsupported store backend: {0}")]
    UnsupportedBackend(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Record,
}

impl Document {
    /// Decode the document body, handing back the id alongside.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Equality match on a single top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.field) == Some(&self.value)
    }
}

pub(crate) fn apply_filter(docs: Vec<Document>, filter: Option<&Filter>) -> Vec<Document> {
    match filter {
        Some(f) => docs.into_iter().filter(|d| f.matches(&d.data)).collect(),
        None => docs,
    }
}

/// Shallow merge, as the hosted document database does for partial updates.
pub(crate) fn merge(target: &mut Record, partial: Record) {
    for (key, value) in partial {
        target.insert(key, value);
    }
}

/// Encode a serializable value as a document body.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(serde::ser::Error::custom(format!(
            "expected an object, got {other}"
        )))),
    }
}

/// Encode `value` and keep only the listed fields.
pub fn patch<T: Serialize>(value: &T, fields: &[&str]) -> Result<Record, StoreError> {
    let mut full = to_record(value)?;
    let mut out = Record::new();
    for field in fields {
        // Absent optional fields are written as null so the stored value is cleared.
        out.insert(
            (*field).to_string(),
            full.remove(*field).unwrap_or(Value::Null),
        );
    }
    Ok(out)
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError>;

    async fn update(&self, collection: &str, id: &str, partial: Record) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn list(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Emits the current matching snapshot, then a fresh one after every write
    /// to the collection made through this store.
    async fn subscribe(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<DocumentStream, StoreError>;
}

/// Per-collection change notifications shared by the backends.
#[derive(Debug)]
pub(crate) struct Notifier {
    tx: broadcast::Sender<String>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub(crate) fn notify(&self, collection: &str) {
        // No receivers is fine.
        let _ = self.tx.send(collection.to_string());
    }

    pub(crate) fn listen(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

/// Build a snapshot stream: one initial snapshot, then one per notification for
/// `collection`. `load` re-reads the collection each time.
pub(crate) fn snapshot_stream<F, Fut>(
    collection: String,
    filter: Option<Filter>,
    rx: broadcast::Receiver<String>,
    load: F,
) -> DocumentStream
where
    F: Fn(String, Option<Filter>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Vec<Document>, StoreError>> + Send + 'static,
{
    use broadcast::error::RecvError;

    let state = (rx, true);
    let load = Arc::new(load);
    Box::pin(futures::stream::unfold(state, move |(mut rx, first)| {
        let load = Arc::clone(&load);
        let collection = collection.clone();
        let filter = filter.clone();
        async move {
            if !first {
                loop {
                    match rx.recv().await {
                        Ok(changed) if changed == collection => break,
                        Ok(_) => continue,
                        // Missed notifications collapse into one fresh snapshot.
                        Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
            match load(collection, filter).await {
                Ok(docs) => Some((docs, (rx, false))),
                Err(err) => {
                    tracing::error!("subscription reload failed: {}", err);
                    None
                }
            }
        }
    }))
}

/// Open the backend named in configuration.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        "sqlite" => Arc::new(SqliteStore::connect(&config.url, config.max_connections).await?),
        other => return Err(StoreError::UnsupportedBackend(other.to_string())),
    };
    info!("Document store opened: {}", config.backend);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn merge_replaces_only_given_fields() {
        let mut target = record(json!({"status": "Queue", "name": "A. Hassan"}));
        merge(&mut target, record(json!({"status": "Labs"})));
        assert_eq!(target, record(json!({"status": "Labs", "name": "A. Hassan"})));
    }

    #[test]
    fn patch_writes_null_for_absent_fields() {
        #[derive(Serialize)]
        struct Row {
            a: u8,
            #[serde(skip_serializing_if = "Option::is_none")]
            b: Option<u8>,
        }
        let out = patch(&Row { a: 1, b: None }, &["a", "b"]).unwrap();
        assert_eq!(out, record(json!({"a": 1, "b": null})));
    }

    #[test]
    fn filter_matches_on_equality() {
        let f = Filter::eq("encounterType", "OPD");
        assert!(f.matches(&record(json!({"encounterType": "OPD"}))));
        assert!(!f.matches(&record(json!({"encounterType": "Inpatient"}))));
        assert!(!f.matches(&record(json!({}))));
    }
}
