// In-process record store. Keeps documents per (kind, tenant) in insertion
// order and pushes full result sets to live subscribers on every write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::core::{RecordId, TenantId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::record_store::{fresh_id, RecordQuery, RecordSink, RecordStore, RecordStream};
use crate::models::{Document, EntityKind};

struct Subscriber {
    query: RecordQuery,
    sink: RecordSink,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<(EntityKind, TenantId), Vec<Document>>,
    subscribers: Vec<Subscriber>,
}

impl MemoryState {
    fn result_set(&self, query: &RecordQuery) -> Vec<Document> {
        self.tables
            .get(&(query.kind, query.tenant.clone()))
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default()
    }

    /// Re-deliver to every subscriber of (kind, tenant); prune closed ones
    fn notify(&mut self, kind: EntityKind, tenant: &TenantId) {
        let subscribers = std::mem::take(&mut self.subscribers);
        self.subscribers = subscribers
            .into_iter()
            .filter(|sub| {
                if sub.query.covers(kind, tenant) {
                    sub.sink.send(Ok(self.result_set(&sub.query))).is_ok()
                } else {
                    !sub.sink.is_closed()
                }
            })
            .collect();
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an error to every live subscriber of (kind, tenant), as a
    /// transport or permission failure would
    pub async fn fail(&self, kind: EntityKind, tenant: &TenantId, reason: &str) {
        let mut state = self.state.write().await;
        state.subscribers.retain(|sub| {
            if sub.query.covers(kind, tenant) {
                sub.sink
                    .send(Err(AppError::SubscriptionError(reason.to_string())))
                    .is_ok()
            } else {
                !sub.sink.is_closed()
            }
        });
    }

    /// Number of subscriptions whose receiver is still alive
    pub async fn live_subscriptions(&self) -> usize {
        let mut state = self.state.write().await;
        state.subscribers.retain(|sub| !sub.sink.is_closed());
        state.subscribers.len()
    }

    pub async fn live_subscriptions_for(&self, tenant: &TenantId) -> usize {
        let mut state = self.state.write().await;
        state.subscribers.retain(|sub| !sub.sink.is_closed());
        state
            .subscribers
            .iter()
            .filter(|sub| &sub.query.tenant == tenant)
            .count()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn subscribe(&self, query: RecordQuery) -> AppResult<RecordStream> {
        let (sink, stream) = mpsc::unbounded_channel();
        let mut state = self.state.write().await;
        sink.send(Ok(state.result_set(&query)))
            .map_err(|_| AppError::SubscriptionError("Subscriber dropped".to_string()))?;
        debug!("Opened {} subscription for tenant {}", query.kind, query.tenant);
        state.subscribers.push(Subscriber { query, sink });
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

        let mut state = self.state.write().await;
        let table = state.tables.entry((kind, tenant.clone())).or_default();
        match table.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.body = body,
            None => table.push(Document::new(id.clone(), body)),
        }
        state.notify(kind, tenant);
        Ok(id)
    }

    async fn delete(&self, kind: EntityKind, tenant: &TenantId, id: &RecordId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let removed = match state.tables.get_mut(&(kind, tenant.clone())) {
            Some(table) => {
                let before = table.len();
                table.retain(|d| &d.id != id);
                table.len() != before
            }
            None => false,
        };
        if removed {
            state.notify(kind, tenant);
        }
        Ok(removed)
    }
}
