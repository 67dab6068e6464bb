use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::{RecordId, TenantId};
use crate::error::AppResult;
use crate::models::{Document, EntityKind};

/// Live result stream: the complete current matching set on open, then again
/// after every mutation that touches it. Dropping the receiver closes the
/// subscription.
pub type RecordStream = mpsc::UnboundedReceiver<AppResult<Vec<Document>>>;

pub type RecordSink = mpsc::UnboundedSender<AppResult<Vec<Document>>>;

/// A live query: one entity kind of one tenant, optionally narrowed by
/// top-level field equality
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub kind: EntityKind,
    pub tenant: TenantId,
    pub equals: Vec<(String, Value)>,
}

impl RecordQuery {
    pub fn new(kind: EntityKind, tenant: TenantId) -> Self {
        Self {
            kind,
            tenant,
            equals: Vec::new(),
        }
    }

    pub fn with_equals(mut self, field: impl Into<String>, value: Value) -> Self {
        self.equals.push((field.into(), value));
        self
    }

    pub fn covers(&self, kind: EntityKind, tenant: &TenantId) -> bool {
        self.kind == kind && &self.tenant == tenant
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| doc.field(field) == Some(expected))
    }
}

/// Tenant-scoped document store with live subscriptions. Writes are the
/// collaborator CRUD surface; the rollup engines only ever subscribe.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn subscribe(&self, query: RecordQuery) -> AppResult<RecordStream>;

    /// Insert or replace a record. A missing id gets a fresh one.
    async fn put(
        &self,
        kind: EntityKind,
        tenant: &TenantId,
        id: Option<RecordId>,
        body: Value,
    ) -> AppResult<RecordId>;

    /// Returns false when nothing was deleted
    async fn delete(&self, kind: EntityKind, tenant: &TenantId, id: &RecordId) -> AppResult<bool>;
}

pub(crate) fn fresh_id() -> RecordId {
    RecordId::new(uuid::Uuid::new_v4().to_string())
}
