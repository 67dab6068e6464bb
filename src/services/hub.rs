use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::TenantId;
use crate::error::AppResult;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::record_store::RecordStore;
use crate::services::dashboard::{DashboardHandle, DashboardSession, DashboardView, SessionConfig, ViewMode};

type SessionKey = (TenantId, ViewMode);

/// Bounds on how many sessions stay subscribed
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Least recently read sessions are closed beyond this many
    pub max_sessions: usize,
    /// Sessions unread for this long are closed by the sweeper. `None` keeps
    /// them until they are pushed out by `max_sessions`.
    pub idle_timeout: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

struct SessionEntry {
    handle: Arc<DashboardHandle>,
    last_read: Instant,
}

/// Keeps one live dashboard session per (tenant, mode) so that HTTP reads
/// are served from already-subscribed collections instead of re-reading the
/// store on every request.
///
/// The registry lock is only held for map bookkeeping. Waiting for a view to
/// settle, opening a session and closing evicted ones all happen after it is
/// released, so one slow tenant never stalls reads of another.
pub struct DashboardHub {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    limits: HubConfig,
    sessions: Mutex<HashMap<SessionKey, SessionEntry>>,
}

impl DashboardHub {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
        limits: HubConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            limits,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Latest view for (tenant, mode), opening a session on first use. A new
    /// session is given up to the settle timeout to receive its first
    /// deliveries; whatever is still missing shows up in `completeness`.
    pub async fn view(&self, tenant: &TenantId, mode: ViewMode) -> AppResult<Arc<DashboardView>> {
        let handle = self.session(tenant, mode).await?;
        Ok(handle.settled(self.config.settle_timeout).await)
    }

    async fn session(&self, tenant: &TenantId, mode: ViewMode) -> AppResult<Arc<DashboardHandle>> {
        let key = (tenant.clone(), mode);
        if let Some(handle) = self.touch(&key).await {
            return Ok(handle);
        }

        let opened = Arc::new(
            DashboardSession::spawn(
                Arc::clone(&self.store),
                tenant.clone(),
                mode,
                Arc::clone(&self.clock),
                self.config.clone(),
            )
            .await?,
        );

        let (handle, to_close) = {
            let mut sessions = self.sessions.lock().await;
            let raced = sessions
                .get(&key)
                .filter(|entry| entry.handle.is_running())
                .map(|entry| Arc::clone(&entry.handle));
            match raced {
                // another reader opened the same session meanwhile
                Some(existing) => (existing, vec![opened]),
                None => {
                    sessions.insert(
                        key.clone(),
                        SessionEntry {
                            handle: Arc::clone(&opened),
                            last_read: Instant::now(),
                        },
                    );
                    info!("Opened {:?} dashboard session for tenant {}", mode, tenant);
                    let evicted = evict_least_recent(&mut sessions, self.limits.max_sessions, &key);
                    (opened, evicted)
                }
            }
        };

        close_each(to_close).await;
        Ok(handle)
    }

    /// Running session for `key` with its read time refreshed. A stopped
    /// session is dropped so the caller reopens it.
    async fn touch(&self, key: &SessionKey) -> Option<Arc<DashboardHandle>> {
        let mut sessions = self.sessions.lock().await;
        let running = sessions.get(key).map(|entry| entry.handle.is_running())?;
        if !running {
            warn!("Dashboard session for {} ({:?}) stopped; reopening", key.0, key.1);
            sessions.remove(key);
            return None;
        }
        sessions.get_mut(key).map(|entry| {
            entry.last_read = Instant::now();
            Arc::clone(&entry.handle)
        })
    }

    /// Close every session not read within the idle timeout, and any that
    /// stopped on their own. Returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let Some(idle_timeout) = self.limits.idle_timeout else {
            return 0;
        };

        let expired: Vec<Arc<DashboardHandle>> = {
            let mut sessions = self.sessions.lock().await;
            let keys: Vec<SessionKey> = sessions
                .iter()
                .filter(|(_, entry)| {
                    !entry.handle.is_running() || entry.last_read.elapsed() >= idle_timeout
                })
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter()
                .filter_map(|key| sessions.remove(key))
                .map(|entry| entry.handle)
                .collect()
        };

        let count = expired.len();
        if count > 0 {
            info!("Evicted {} idle dashboard sessions", count);
        }
        close_each(expired).await;
        count
    }

    /// Periodically run `evict_idle` in the background. Nothing is spawned
    /// when idle eviction is disabled.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let idle_timeout = self.limits.idle_timeout?;
        let period = (idle_timeout / 2).max(Duration::from_secs(1));
        let hub = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                hub.evict_idle().await;
            }
        }))
    }

    /// Stop a session. Returns false if none was open.
    pub async fn close(&self, tenant: &TenantId, mode: ViewMode) -> bool {
        let entry = self.sessions.lock().await.remove(&(tenant.clone(), mode));
        match entry {
            Some(entry) => {
                entry.handle.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let handles: Vec<Arc<DashboardHandle>> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, entry)| entry.handle)
            .collect();
        close_each(handles).await;
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Remove the least recently read sessions until at most `max` remain,
/// never choosing `keep`
fn evict_least_recent(
    sessions: &mut HashMap<SessionKey, SessionEntry>,
    max: usize,
    keep: &SessionKey,
) -> Vec<Arc<DashboardHandle>> {
    let mut evicted = Vec::new();
    while sessions.len() > max.max(1) {
        let oldest = sessions
            .iter()
            .filter(|(key, _)| *key != keep)
            .min_by_key(|(_, entry)| entry.last_read)
            .map(|(key, _)| key.clone());
        let Some(key) = oldest else {
            break;
        };
        if let Some(entry) = sessions.remove(&key) {
            debug!("Evicting {:?} dashboard session for tenant {}", key.1, key.0);
            evicted.push(entry.handle);
        }
    }
    evicted
}

async fn close_each(handles: Vec<Arc<DashboardHandle>>) {
    for handle in handles {
        handle.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RecordId;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::memory_store::InMemoryRecordStore;
    use crate::infrastructure::record_store::{RecordQuery, RecordSink, RecordStream};
    use crate::models::EntityKind;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    fn hub(store: Arc<dyn RecordStore>, config: SessionConfig, limits: HubConfig) -> DashboardHub {
        DashboardHub::new(store, Arc::new(SystemClock), config, limits)
    }

    /// Subscriptions for one tenant open but never deliver
    struct StalledStore {
        inner: InMemoryRecordStore,
        stalled: TenantId,
        held: std::sync::Mutex<Vec<RecordSink>>,
    }

    #[async_trait]
    impl RecordStore for StalledStore {
        async fn subscribe(&self, query: RecordQuery) -> AppResult<RecordStream> {
            if query.tenant == self.stalled {
                let (tx, rx) = mpsc::unbounded_channel();
                self.held.lock().unwrap().push(tx);
                return Ok(rx);
            }
            self.inner.subscribe(query).await
        }

        async fn put(
            &self,
            kind: EntityKind,
            tenant: &TenantId,
            id: Option<RecordId>,
            body: Value,
        ) -> AppResult<RecordId> {
            self.inner.put(kind, tenant, id, body).await
        }

        async fn delete(&self, kind: EntityKind, tenant: &TenantId, id: &RecordId) -> AppResult<bool> {
            self.inner.delete(kind, tenant, id).await
        }
    }

    #[tokio::test]
    async fn test_sessions_are_reused_per_tenant_and_mode() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        store
            .put(EntityKind::Shop, &tenant, Some("s1".into()), json!({"name": "Main"}))
            .await
            .unwrap();
        let hub = hub(Arc::new(store.clone()), SessionConfig::default(), HubConfig::default());

        let first = hub.view(&tenant, ViewMode::Business).await.unwrap();
        assert!(first.completeness.is_complete);
        assert_eq!(first.business.as_ref().unwrap().global.shop_count, 1);

        hub.view(&tenant, ViewMode::Business).await.unwrap();
        assert_eq!(hub.session_count().await, 1);
        assert_eq!(store.live_subscriptions().await, 5);

        hub.view(&tenant, ViewMode::Talent).await.unwrap();
        assert_eq!(hub.session_count().await, 2);

        assert!(hub.close(&tenant, ViewMode::Business).await);
        assert!(!hub.close(&tenant, ViewMode::Business).await);
        hub.close_all().await;
        assert_eq!(hub.session_count().await, 0);
        assert_eq!(store.live_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_unsettled_tenant_does_not_block_other_reads() {
        let inner = InMemoryRecordStore::new();
        let warm = TenantId::new("t-1");
        let slow = TenantId::new("slow");
        let store = StalledStore {
            inner: inner.clone(),
            stalled: slow.clone(),
            held: std::sync::Mutex::new(Vec::new()),
        };
        let config = SessionConfig {
            settle_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        };
        let hub = Arc::new(hub(Arc::new(store), config, HubConfig::default()));
        hub.view(&warm, ViewMode::Business).await.unwrap();

        let waiting = {
            let hub = Arc::clone(&hub);
            let slow = slow.clone();
            tokio::spawn(async move { hub.view(&slow, ViewMode::Business).await })
        };
        while hub.session_count().await < 2 {
            tokio::task::yield_now().await;
        }

        let warm_read = tokio::time::timeout(Duration::from_millis(500), hub.view(&warm, ViewMode::Business)).await;
        assert!(warm_read.expect("warm read waited on the slow tenant").is_ok());
        let cold_read = tokio::time::timeout(Duration::from_millis(500), hub.view(&warm, ViewMode::Talent)).await;
        assert!(cold_read.expect("new session waited on the slow tenant").is_ok());
        assert!(!waiting.is_finished());

        waiting.abort();
        hub.close_all().await;
        assert_eq!(inner.live_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_least_recent_session_is_evicted_over_capacity() {
        let store = InMemoryRecordStore::new();
        let first = TenantId::new("t-1");
        let second = TenantId::new("t-2");
        let limits = HubConfig {
            max_sessions: 1,
            idle_timeout: None,
        };
        let hub = hub(Arc::new(store.clone()), SessionConfig::default(), limits);

        hub.view(&first, ViewMode::Business).await.unwrap();
        assert_eq!(store.live_subscriptions_for(&first).await, 5);

        hub.view(&second, ViewMode::Business).await.unwrap();
        assert_eq!(hub.session_count().await, 1);
        assert_eq!(store.live_subscriptions_for(&first).await, 0);
        assert_eq!(store.live_subscriptions_for(&second).await, 5);

        // an evicted tenant is simply reopened on its next read
        let view = hub.view(&first, ViewMode::Business).await.unwrap();
        assert_eq!(view.tenant, first);
        assert_eq!(store.live_subscriptions_for(&second).await, 0);
        assert_eq!(hub.evict_idle().await, 0);
        hub.close_all().await;
    }

    #[tokio::test]
    async fn test_idle_sessions_are_swept() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        let limits = HubConfig {
            max_sessions: 8,
            idle_timeout: Some(Duration::from_millis(20)),
        };
        let hub = hub(Arc::new(store.clone()), SessionConfig::default(), limits);

        hub.view(&tenant, ViewMode::Business).await.unwrap();
        hub.view(&tenant, ViewMode::Talent).await.unwrap();
        assert_eq!(store.live_subscriptions_for(&tenant).await, 10);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hub.evict_idle().await, 2);
        assert_eq!(hub.session_count().await, 0);
        assert_eq!(store.live_subscriptions().await, 0);
    }
}
