use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::{RecordId, TenantId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::record_store::{fresh_id, RecordQuery, RecordStore, RecordStream};
use crate::models::{Document, EntityKind};

const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct ChangeNotice {
    kind: EntityKind,
    tenant: TenantId,
}

/// SQLite implementation of the record store. Documents are kept as JSON
/// text; every write publishes a change notice and each live subscription
/// re-reads its full result set when a notice for its (kind, tenant) arrives.
pub struct SqliteRecordStore {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeNotice>,
}

impl SqliteRecordStore {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid database URL {}: {}", url, e)))?
            .create_if_missing(true);

        // get_filename consumes its options
        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::ConfigurationError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if in_memory {
            // a single connection that never recycles is the whole database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        let store = Self::from_pool(pool);
        store.initialize().await?;
        info!("SQLite record store ready at {}", url);
        Ok(store)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    fn from_pool(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (kind, tenant_id, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create records table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_scope ON records(kind, tenant_id, seq)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create records index: {}", e)))?;

        Ok(())
    }

    fn publish(&self, kind: EntityKind, tenant: &TenantId) {
        // no receivers just means nobody is subscribed right now
        let _ = self.changes.send(ChangeNotice {
            kind,
            tenant: tenant.clone(),
        });
    }
}

async fn fetch(pool: &SqlitePool, query: &RecordQuery) -> AppResult<Vec<Document>> {
    let rows = sqlx::query("SELECT id, body FROM records WHERE kind = ? AND tenant_id = ? ORDER BY seq")
        .bind(query.kind.as_str())
        .bind(query.tenant.as_str())
        .fetch_all(pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to read {} for tenant {}: {}",
                query.kind, query.tenant, e
            ))
        })?;

    let mut documents = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let body: String = row.get("body");
        match serde_json::from_str::<Value>(&body) {
            Ok(body) => {
                let doc = Document::new(id, body);
                if query.matches(&doc) {
                    documents.push(doc);
                }
            }
            Err(e) => warn!("Skipping unreadable {} document {}: {}", query.kind, id, e),
        }
    }
    Ok(documents)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn subscribe(&self, query: RecordQuery) -> AppResult<RecordStream> {
        // listen before the first read so no write slips between them
        let mut changes = self.changes.subscribe();
        let (sink, stream) = mpsc::unbounded_channel();
        let initial = fetch(&self.pool, &query).await?;
        sink.send(Ok(initial))
            .map_err(|_| AppError::SubscriptionError("Subscriber dropped".to_string()))?;

        let pool = self.pool.clone();
        tokio::spawn(async move {
            loop {
                let notice = tokio::select! {
                    _ = sink.closed() => break,
                    notice = changes.recv() => notice,
                };
                match notice {
                    Ok(notice) if query.covers(notice.kind, &notice.tenant) => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{} subscription for {} lagged by {} notices; re-reading", query.kind, query.tenant, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
                if sink.send(fetch(&pool, &query).await).is_err() {
                    break;
                }
            }
            debug!("Closed {} subscription for tenant {}", query.kind, query.tenant);
        });

        Ok(stream)
    }

    async fn put(
        &self,
        kind: EntityKind,
        tenant: &TenantId,
        id: Option<RecordId>,
        body: Value,
    ) -> AppResult<RecordId> {
        let body = Document::stamp_tenant(body, tenant)?;
        let id = id.unwrap_or_else(fresh_id);
        let text = serde_json::to_string(&body)
            .map_err(|e| AppError::SerializationError(format!("Failed to encode record {}: {}", id, e)))?;

        sqlx::query(
            r#"
            INSERT INTO records (kind, tenant_id, id, body, updated_at) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (kind, tenant_id, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(tenant.as_str())
        .bind(id.as_str())
        .bind(text)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to write {} {}: {}", kind, id, e)))?;

        self.publish(kind, tenant);
        Ok(id)
    }

    async fn delete(&self, kind: EntityKind, tenant: &TenantId, id: &RecordId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE kind = ? AND tenant_id = ? AND id = ?")
            .bind(kind.as_str())
            .bind(tenant.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete {} {}: {}", kind, id, e)))?;

        let removed = result.rows_affected() > 0;
        if removed {
            self.publish(kind, tenant);
        }
        Ok(removed)
    }
}
