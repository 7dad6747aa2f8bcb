//! SQLite-backed document store. One row per document, body kept as JSON text.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    apply_filter, merge, snapshot_stream, Document, DocumentStore, DocumentStream, Filter, Notifier,
    Record, StoreError,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
    notifier: Arc<Notifier>,
}

impl SqliteStore {
    /// Connect and make sure the documents table exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        Self::initialize_schema(&pool).await?;
        Ok(Self {
            pool: Arc::new(pool),
            notifier: Arc::new(Notifier::new()),
        })
    }

    async fn initialize_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (collection, id)
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn load(pool: &SqlitePool, collection: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query("SELECT id, body FROM documents WHERE collection = ? ORDER BY seq")
            .bind(collection)
            .fetch_all(pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<Document, StoreError> {
                let id: String = row.try_get("id")?;
                let body: String = row.try_get("body")?;
                Ok(Document {
                    id,
                    data: parse_body(&body)?,
                })
            })
            .collect()
    }
}

fn parse_body(body: &str) -> Result<Record, StoreError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(serde::de::Error::custom(format!(
            "stored document is not an object: {other}"
        )))),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    #[instrument(skip(self, record))]
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO documents (collection, id, body, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(&id)
        .bind(serde_json::to_string(&record)?)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        debug!("created {}/{}", collection, id);
        self.notifier.notify(collection);
        Ok(id)
    }

    #[instrument(skip(self, partial))]
    async fn update(&self, collection: &str, id: &str, partial: Record) -> Result<(), StoreError> {
        // Read-modify-write in one transaction; concurrent writers race last-writer-wins.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::MissingDocument {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        let body: String = row.try_get("body")?;
        let mut data = parse_body(&body)?;
        merge(&mut data, partial);

        sqlx::query("UPDATE documents SET body = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(serde_json::to_string(&data)?)
            .bind(Utc::now().timestamp())
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!("updated {}/{}", collection, id);
        self.notifier.notify(collection);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                Ok(Some(Document {
                    id: id.to_string(),
                    data: parse_body(&body)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = Self::load(&self.pool, collection).await?;
        Ok(apply_filter(docs, filter.as_ref()))
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<DocumentStream, StoreError> {
        let pool = Arc::clone(&self.pool);
        let rx = self.notifier.listen();
        Ok(snapshot_stream(collection.to_string(), filter, rx, move |name, filter| {
            let pool = Arc::clone(&pool);
            async move {
                let docs = Self::load(&pool, &name).await?;
                Ok(apply_filter(docs, filter.as_ref()))
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn create_get_and_update() {
        let store = store().await;
        let id = store
            .create("patients", record(json!({"mrn": "TZ-2025-1103", "status": "Queue"})))
            .await
            .unwrap();

        store
            .update("patients", &id, record(json!({"status": "In Progress"})))
            .await
            .unwrap();

        let doc = store.get("patients", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["mrn"], "TZ-2025-1103");
        assert_eq!(doc.data["status"], "In Progress");
        assert!(store.get("patients", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_keeps_creation_order_and_filters() {
        let store = store().await;
        for (mrn, kind) in [("A", "OPD"), ("B", "Inpatient"), ("C", "OPD")] {
            store
                .create("patients", record(json!({"mrn": mrn, "encounterType": kind})))
                .await
                .unwrap();
        }

        let opd = store
            .list("patients", Some(Filter::eq("encounterType", "OPD")))
            .await
            .unwrap();
        let mrns: Vec<_> = opd.iter().map(|d| d.data["mrn"].clone()).collect();
        assert_eq!(mrns, vec![json!("A"), json!("C")]);
        assert!(store.list("surgeries", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_document_fails() {
        let store = store().await;
        let err = store
            .update("patients", "ghost", Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingDocument { .. }));
    }

    #[tokio::test]
    async fn subscription_sees_committed_writes() {
        let store = store().await;
        let mut feed = store.subscribe("labOrders", None).await.unwrap();
        assert!(feed.next().await.unwrap().is_empty());

        store
            .create("labOrders", record(json!({"status": "Ordered"})))
            .await
            .unwrap();
        let snapshot = feed.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].data["status"], "Ordered");
    }
}
