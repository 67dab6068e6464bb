use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::TenantId;
use crate::error::{AppError, AppResult};
use crate::infrastructure::collections::{CollectionStatus, Collections};
use crate::infrastructure::record_store::{RecordQuery, RecordStore};
use crate::models::{Document, EntityKind};

/// One delivery from a forwarder task, tagged with the scope generation that
/// opened it
struct Delivery {
    generation: u64,
    kind: EntityKind,
    outcome: AppResult<Vec<Document>>,
}

struct ActiveScope {
    tenant: TenantId,
    tasks: Vec<JoinHandle<()>>,
}

/// Emitted after a delivery has been applied to the collections
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChanged {
    pub tenant: TenantId,
    pub kind: EntityKind,
    pub generation: u64,
    pub records: usize,
    pub status: CollectionStatus,
}

/// Owns the live subscriptions of one scope (a tenant plus the entity kinds
/// a view needs) and the collections they feed.
///
/// Each subscription gets a forwarder task that tags deliveries with the
/// generation of the scope that opened it and pushes them onto a single
/// channel. `next_change` applies them one at a time, so collection updates
/// are serialized with whatever else the caller's loop does. Opening a new
/// scope first closes the old one and bumps the generation; anything still
/// in flight from the old scope is discarded.
pub struct SubscriptionManager {
    store: Arc<dyn RecordStore>,
    events_tx: mpsc::UnboundedSender<Delivery>,
    events_rx: mpsc::UnboundedReceiver<Delivery>,
    generation: u64,
    scope: Option<ActiveScope>,
    collections: Arc<Collections>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store,
            events_tx,
            events_rx,
            generation: 0,
            scope: None,
            collections: Arc::new(Collections::for_tenant(TenantId::default(), &[])),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        self.scope.as_ref().map(|scope| &scope.tenant)
    }

    pub fn is_open(&self) -> bool {
        self.scope.is_some()
    }

    /// Current collections. Cheap to clone and immutable; later deliveries
    /// copy on write.
    pub fn snapshot(&self) -> Arc<Collections> {
        Arc::clone(&self.collections)
    }

    /// Close the current scope, then subscribe to every kind for `tenant`.
    /// A kind whose subscribe call fails is recorded as a failed delivery
    /// rather than failing the whole scope.
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn open(&mut self, tenant: TenantId, kinds: &[EntityKind]) -> AppResult<()> {
        if tenant.is_blank() {
            return Err(AppError::Validation("Tenant id must not be blank".to_string()));
        }

        self.close().await;
        self.generation += 1;
        let generation = self.generation;

        let mut unique: Vec<EntityKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !unique.contains(kind) {
                unique.push(*kind);
            }
        }
        self.collections = Arc::new(Collections::for_tenant(tenant.clone(), &unique));

        let mut tasks = Vec::with_capacity(unique.len());
        for kind in unique {
            match self.store.subscribe(RecordQuery::new(kind, tenant.clone())).await {
                Ok(mut stream) => {
                    let events = self.events_tx.clone();
                    tasks.push(tokio::spawn(async move {
                        while let Some(outcome) = stream.recv().await {
                            let delivery = Delivery {
                                generation,
                                kind,
                                outcome,
                            };
                            if events.send(delivery).is_err() {
                                break;
                            }
                        }
                    }));
                }
                Err(e) => {
                    warn!("Failed to subscribe to {} for tenant {}: {}", kind, tenant, e);
                    // the receiver lives as long as self
                    let _ = self.events_tx.send(Delivery {
                        generation,
                        kind,
                        outcome: Err(e),
                    });
                }
            }
        }

        info!(
            "Opened {} subscriptions for tenant {} (generation {})",
            tasks.len(),
            tenant,
            generation
        );
        self.scope = Some(ActiveScope { tenant, tasks });
        Ok(())
    }

    /// Tear down every subscription of the current scope. Returns once the
    /// forwarder tasks are gone, so their streams are dropped by then.
    #[instrument(skip(self))]
    pub async fn close(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };

        for task in &scope.tasks {
            task.abort();
        }
        for task in scope.tasks {
            // cancelled is the expected outcome
            let _ = task.await;
        }

        let mut dropped = 0;
        while self.events_rx.try_recv().is_ok() {
            dropped += 1;
        }
        info!(
            "Closed subscriptions for tenant {} (generation {}, {} undelivered)",
            scope.tenant, self.generation, dropped
        );
    }

    /// Wait for the next delivery of the open scope and apply it. Errors are
    /// logged and leave the collection empty and marked failed. Pends
    /// forever while no scope is open.
    pub async fn next_change(&mut self) -> Option<CollectionChanged> {
        loop {
            let delivery = self.events_rx.recv().await?;
            if delivery.generation != self.generation || self.scope.is_none() {
                debug!(
                    "Discarding stale {} delivery from generation {}",
                    delivery.kind, delivery.generation
                );
                continue;
            }

            let kind = delivery.kind;
            let collections = Arc::make_mut(&mut self.collections);
            let records = match delivery.outcome {
                Ok(documents) => collections.replace(kind, &documents),
                Err(e) => {
                    warn!(
                        "Subscription to {} for tenant {} failed, treating as empty: {}",
                        kind,
                        collections.tenant(),
                        e
                    );
                    collections.mark_failed(kind, e.to_string());
                    0
                }
            };

            let status = collections
                .status(kind)
                .cloned()
                .unwrap_or(CollectionStatus::Live);
            return Some(CollectionChanged {
                tenant: collections.tenant().clone(),
                kind,
                generation: self.generation,
                records,
                status,
            });
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            for task in scope.tasks {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::InMemoryRecordStore;
    use serde_json::json;

    const KINDS: [EntityKind; 2] = [EntityKind::Shop, EntityKind::Sale];

    async fn drain(manager: &mut SubscriptionManager, count: usize) -> Vec<CollectionChanged> {
        let mut changes = Vec::new();
        for _ in 0..count {
            changes.push(manager.next_change().await.unwrap());
        }
        changes
    }

    #[tokio::test]
    async fn test_one_subscription_per_kind() {
        let store = InMemoryRecordStore::new();
        let mut manager = SubscriptionManager::new(Arc::new(store.clone()));
        manager
            .open(TenantId::new("t-1"), &[EntityKind::Shop, EntityKind::Shop, EntityKind::Sale])
            .await
            .unwrap();
        assert_eq!(store.live_subscriptions().await, 2);

        let changes = drain(&mut manager, 2).await;
        assert!(changes.iter().all(|c| c.status == CollectionStatus::Live));
        assert!(manager.snapshot().completeness().is_complete);
    }

    #[tokio::test]
    async fn test_deliveries_replace_collections() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        let mut manager = SubscriptionManager::new(Arc::new(store.clone()));
        manager.open(tenant.clone(), &KINDS).await.unwrap();
        drain(&mut manager, 2).await;

        let before = manager.snapshot();
        store
            .put(EntityKind::Sale, &tenant, None, json!({"revenue": 10}))
            .await
            .unwrap();
        let change = manager.next_change().await.unwrap();
        assert_eq!(change.kind, EntityKind::Sale);
        assert_eq!(change.records, 1);

        // earlier snapshots are untouched
        assert!(before.sales.is_empty());
        assert_eq!(manager.snapshot().sales.len(), 1);
    }

    #[tokio::test]
    async fn test_switch_closes_previous_scope() {
        let store = InMemoryRecordStore::new();
        let first = TenantId::new("t-1");
        let second = TenantId::new("t-2");
        store
            .put(EntityKind::Shop, &first, Some("a".into()), json!({"name": "A"}))
            .await
            .unwrap();

        let mut manager = SubscriptionManager::new(Arc::new(store.clone()));
        manager.open(first.clone(), &KINDS).await.unwrap();
        // first scope's deliveries are queued but never applied
        manager.open(second.clone(), &KINDS).await.unwrap();

        assert_eq!(store.live_subscriptions_for(&first).await, 0);
        assert_eq!(store.live_subscriptions_for(&second).await, 2);

        store
            .put(EntityKind::Shop, &first, Some("b".into()), json!({"name": "B"}))
            .await
            .unwrap();
        let changes = drain(&mut manager, 2).await;
        assert!(changes.iter().all(|c| c.tenant == second && c.generation == 2));
        assert!(manager.snapshot().shops.is_empty());
        assert_eq!(manager.tenant(), Some(&second));
    }

    #[tokio::test]
    async fn test_failures_fail_open() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        store
            .put(EntityKind::Sale, &tenant, None, json!({"revenue": 10}))
            .await
            .unwrap();

        let mut manager = SubscriptionManager::new(Arc::new(store.clone()));
        manager.open(tenant.clone(), &KINDS).await.unwrap();
        drain(&mut manager, 2).await;
        assert_eq!(manager.snapshot().sales.len(), 1);

        store.fail(EntityKind::Sale, &tenant, "permission denied").await;
        let change = manager.next_change().await.unwrap();
        assert_eq!(change.records, 0);
        assert!(matches!(change.status, CollectionStatus::Failed(_)));

        let snapshot = manager.snapshot();
        assert!(snapshot.sales.is_empty());
        assert!(!snapshot.completeness().is_complete);
    }

    #[tokio::test]
    async fn test_close_and_blank_tenant() {
        let store = InMemoryRecordStore::new();
        let mut manager = SubscriptionManager::new(Arc::new(store.clone()));
        assert!(manager.open(TenantId::new("  "), &KINDS).await.is_err());
        assert!(!manager.is_open());

        manager.open(TenantId::new("t-1"), &KINDS).await.unwrap();
        manager.close().await;
        assert!(!manager.is_open());
        assert_eq!(store.live_subscriptions().await, 0);
    }
}
