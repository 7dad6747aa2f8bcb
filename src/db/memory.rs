use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::{
    apply_filter, merge, snapshot_stream, Document, DocumentStore, DocumentStream, Filter, Notifier,
    Record, StoreError,
};

#[derive(Debug, Default)]
struct Inner {
    // Insertion order is kept so snapshots read in creation order.
    collections: DashMap<String, Vec<Document>>,
}

/// Process-local document store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
    notifier: Arc<Notifier>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            notifier: Arc::new(Notifier::new()),
        }
    }

    fn snapshot(inner: &Inner, collection: &str, filter: Option<&Filter>) -> Vec<Document> {
        let docs = inner
            .collections
            .get(collection)
            .map(|docs| docs.value().clone())
            .unwrap_or_default();
        apply_filter(docs, filter)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                data: record,
            });
        debug!("created {}/{}", collection, id);
        self.notifier.notify(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, partial: Record) -> Result<(), StoreError> {
        {
            let mut docs = self.inner.collections.get_mut(collection).ok_or_else(|| {
                StoreError::MissingDocument {
                    collection: collection.to_string(),
                    id: id.to_string(),
                }
            })?;
            let doc = docs
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| StoreError::MissingDocument {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            merge(&mut doc.data, partial);
        }
        debug!("updated {}/{}", collection, id);
        self.notifier.notify(collection);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned()))
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(Self::snapshot(&self.inner, collection, filter.as_ref()))
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<DocumentStream, StoreError> {
        let inner = Arc::clone(&self.inner);
        let rx = self.notifier.listen();
        Ok(snapshot_stream(collection.to_string(), filter, rx, move |name, filter| {
            let docs = Self::snapshot(&inner, &name, filter.as_ref());
            async move { Ok(docs) }
        }))
    }
}
