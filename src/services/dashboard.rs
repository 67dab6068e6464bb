// Dashboard session: the serial scheduler that owns one subscription scope,
// recomputes rollups on every collection change or filter command, and
// publishes the result as an immutable view.

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::{TenantId, YearMonth};
use crate::engine::{aggregate_business, talent_report, BusinessRollup, FilterContext, TalentReport};
use crate::error::{AppError, AppResult};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::collections::{Collections, DataCompleteness};
use crate::infrastructure::record_store::RecordStore;
use crate::infrastructure::subscription_manager::{CollectionChanged, SubscriptionManager};
use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Business,
    Talent,
}

impl ViewMode {
    pub fn required_kinds(&self) -> &'static [EntityKind] {
        match self {
            ViewMode::Business => &[
                EntityKind::Profile,
                EntityKind::Shop,
                EntityKind::Product,
                EntityKind::Sale,
                EntityKind::Content,
            ],
            ViewMode::Talent => &[
                EntityKind::Profile,
                EntityKind::Talent,
                EntityKind::KpiTarget,
                EntityKind::TalentPosting,
                EntityKind::DailyTarget,
            ],
        }
    }
}

/// What a dashboard shows at one revision. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub tenant: TenantId,
    pub tenant_name: Option<String>,
    pub mode: ViewMode,
    pub filter: FilterContext,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<BusinessRollup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talent: Option<TalentReport>,
    pub completeness: DataCompleteness,
    /// The snapshot the rollups were computed from
    #[serde(skip)]
    pub collections: Arc<Collections>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub utc_offset: FixedOffset,
    pub channel_capacity: usize,
    pub settle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            channel_capacity: 256,
            settle_timeout: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DashboardCommand {
    SwitchTenant(TenantId),
    SetFilter(FilterContext),
    ResetFilter,
    Close,
}

enum SessionEvent {
    Changed(CollectionChanged),
    Command(DashboardCommand),
}

/// Caller side of a running session
pub struct DashboardHandle {
    commands: mpsc::Sender<DashboardCommand>,
    view: watch::Receiver<Arc<DashboardView>>,
    task: JoinHandle<()>,
}

impl DashboardHandle {
    /// Latest published view
    pub fn current(&self) -> Arc<DashboardView> {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DashboardView>> {
        self.view.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn send(&self, command: DashboardCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::SubscriptionError("Dashboard session has stopped".to_string()))
    }

    pub async fn switch_tenant(&self, tenant: TenantId) -> AppResult<()> {
        if tenant.is_blank() {
            return Err(AppError::Validation("Tenant id must not be blank".to_string()));
        }
        self.send(DashboardCommand::SwitchTenant(tenant)).await
    }

    pub async fn set_filter(&self, filter: FilterContext) -> AppResult<()> {
        filter.validate()?;
        self.send(DashboardCommand::SetFilter(filter)).await
    }

    pub async fn reset_filter(&self) -> AppResult<()> {
        self.send(DashboardCommand::ResetFilter).await
    }

    /// Wait until a view satisfying `ready` is published, or the timeout
    /// passes. Either way the latest view is returned.
    pub async fn wait_for<F>(&self, timeout: Duration, ready: F) -> Arc<DashboardView>
    where
        F: Fn(&DashboardView) -> bool,
    {
        let mut view = self.view.clone();
        let waited = tokio::time::timeout(timeout, view.wait_for(|v| ready(v))).await;
        match waited {
            Ok(Ok(found)) => found.clone(),
            Ok(Err(_)) => self.current(),
            Err(_) => {
                debug!("Timed out waiting for dashboard view after {:?}", timeout);
                self.current()
            }
        }
    }

    /// Wait until no required collection is still pending
    pub async fn settled(&self, timeout: Duration) -> Arc<DashboardView> {
        self.wait_for(timeout, |v| v.completeness.pending.is_empty()).await
    }

    /// Stop the session and wait for its subscriptions to close. The view
    /// channel only closes once the loop has torn its scope down, so this
    /// works from any shared reference to the handle.
    pub async fn close(&self) {
        // a stopped session has already dropped its receiver
        let _ = self.commands.send(DashboardCommand::Close).await;
        let mut view = self.view.clone();
        while view.changed().await.is_ok() {}
        debug!("Dashboard session closed");
    }
}

pub struct DashboardSession {
    tenant: TenantId,
    mode: ViewMode,
    filter: FilterContext,
    revision: u64,
    manager: SubscriptionManager,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<DashboardCommand>,
    view_tx: watch::Sender<Arc<DashboardView>>,
}

impl DashboardSession {
    /// Open the scope for `tenant`, publish an initial (all pending) view and
    /// start the event loop
    pub async fn spawn(
        store: Arc<dyn RecordStore>,
        tenant: TenantId,
        mode: ViewMode,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> AppResult<DashboardHandle> {
        let mut manager = SubscriptionManager::new(store);
        manager.open(tenant.clone(), mode.required_kinds()).await?;

        let filter = FilterContext::new().with_utc_offset(config.utc_offset);
        let (commands_tx, commands) = mpsc::channel(config.channel_capacity.max(1));
        let (view_tx, view) = watch::channel(Arc::new(empty_view(&tenant, mode, &filter, &manager)));

        let mut session = Self {
            tenant,
            mode,
            filter,
            revision: 0,
            manager,
            clock,
            commands,
            view_tx,
        };
        session.recompute();
        info!("Started {:?} dashboard for tenant {}", session.mode, session.tenant);
        let task = tokio::spawn(session.run());

        Ok(DashboardHandle {
            commands: commands_tx,
            view,
            task,
        })
    }

    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                change = self.manager.next_change() => match change {
                    Some(change) => SessionEvent::Changed(change),
                    None => break,
                },
                command = self.commands.recv() => {
                    SessionEvent::Command(command.unwrap_or(DashboardCommand::Close))
                }
            };

            match event {
                SessionEvent::Changed(change) => {
                    debug!(
                        "{} changed for tenant {}: {} records",
                        change.kind, change.tenant, change.records
                    );
                    self.recompute();
                }
                SessionEvent::Command(DashboardCommand::SwitchTenant(tenant)) => {
                    if tenant == self.tenant {
                        continue;
                    }
                    match self.manager.open(tenant.clone(), self.mode.required_kinds()).await {
                        Ok(()) => {
                            self.tenant = tenant;
                            self.filter.reset();
                            self.recompute();
                        }
                        Err(e) => warn!("Ignoring switch to tenant {}: {}", tenant, e),
                    }
                }
                SessionEvent::Command(DashboardCommand::SetFilter(filter)) => {
                    // the wall-clock offset belongs to the session
                    self.filter = FilterContext {
                        utc_offset_seconds: self.filter.utc_offset_seconds,
                        ..filter
                    };
                    self.recompute();
                }
                SessionEvent::Command(DashboardCommand::ResetFilter) => {
                    self.filter.reset();
                    self.recompute();
                }
                SessionEvent::Command(DashboardCommand::Close) => break,
            }
        }

        self.manager.close().await;
        info!("Stopped {:?} dashboard for tenant {}", self.mode, self.tenant);
    }

    #[instrument(skip(self), fields(tenant = %self.tenant, mode = ?self.mode))]
    fn recompute(&mut self) {
        self.revision += 1;
        let collections = self.manager.snapshot();

        let (business, talent) = match self.mode {
            ViewMode::Business => {
                let rollup = aggregate_business(&self.tenant, collections.business_input(), &self.filter);
                (Some(rollup), None)
            }
            ViewMode::Talent => {
                let period = YearMonth::containing(self.clock.now(), self.filter.utc_offset());
                let report = talent_report(&self.tenant, collections.talent_input(), period, &self.filter);
                (None, Some(report))
            }
        };

        let view = DashboardView {
            tenant: self.tenant.clone(),
            tenant_name: collections.tenant_name().map(str::to_string),
            mode: self.mode,
            filter: self.filter.clone(),
            revision: self.revision,
            business,
            talent,
            completeness: collections.completeness(),
            collections,
        };
        self.view_tx.send_replace(Arc::new(view));
    }
}

fn empty_view(
    tenant: &TenantId,
    mode: ViewMode,
    filter: &FilterContext,
    manager: &SubscriptionManager,
) -> DashboardView {
    let collections = manager.snapshot();
    DashboardView {
        tenant: tenant.clone(),
        tenant_name: None,
        mode,
        filter: filter.clone(),
        revision: 0,
        business: None,
        talent: None,
        completeness: collections.completeness(),
        collections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::memory_store::InMemoryRecordStore;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    const SETTLE: Duration = Duration::from_secs(2);

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()))
    }

    async fn seed_business(store: &InMemoryRecordStore, tenant: &TenantId) {
        store
            .put(EntityKind::Shop, tenant, Some("s1".into()), json!({"name": "Main"}))
            .await
            .unwrap();
        store
            .put(EntityKind::Product, tenant, Some("p1".into()), json!({"shopId": "s1", "name": "Kopi"}))
            .await
            .unwrap();
        store
            .put(
                EntityKind::Sale,
                tenant,
                None,
                json!({"shopId": "s1", "productId": "p1", "quantity": 2, "revenue": 20000, "date": "2024-03-01"}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_view_settles_with_rollup() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        seed_business(&store, &tenant).await;

        let handle = DashboardSession::spawn(
            Arc::new(store.clone()),
            tenant.clone(),
            ViewMode::Business,
            clock(),
            SessionConfig::default(),
        )
        .await
        .unwrap();

        let view = handle.settled(SETTLE).await;
        assert!(view.completeness.is_complete);
        let business = view.business.as_ref().unwrap();
        assert_eq!(business.global.revenue, 20000);
        assert_eq!(business.shop_rollups.len(), 1);
        handle.close().await;
        assert_eq!(store.live_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_writes_republish() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        seed_business(&store, &tenant).await;
        let handle = DashboardSession::spawn(
            Arc::new(store.clone()),
            tenant.clone(),
            ViewMode::Business,
            clock(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        handle.settled(SETTLE).await;

        store
            .put(
                EntityKind::Sale,
                &tenant,
                None,
                json!({"shopId": "s1", "productId": "p1", "quantity": 1, "revenue": 10000}),
            )
            .await
            .unwrap();
        let view = handle
            .wait_for(SETTLE, |v| {
                v.business.as_ref().map(|b| b.global.revenue) == Some(30000)
            })
            .await;
        assert_eq!(view.business.as_ref().unwrap().global.units_sold, 3);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_filter_and_reset() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        seed_business(&store, &tenant).await;
        let handle = DashboardSession::spawn(
            Arc::new(store.clone()),
            tenant.clone(),
            ViewMode::Business,
            clock(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        handle.settled(SETTLE).await;

        let march_2 = NaiveDate::from_ymd_opt(2024, 3, 2);
        handle
            .set_filter(FilterContext::new().with_dates(march_2, None))
            .await
            .unwrap();
        let view = handle.wait_for(SETTLE, |v| v.filter.is_active()).await;
        assert_eq!(view.business.as_ref().unwrap().global.revenue, 0);

        handle.reset_filter().await.unwrap();
        let view = handle.wait_for(SETTLE, |v| !v.filter.is_active()).await;
        assert_eq!(view.business.as_ref().unwrap().global.revenue, 20000);

        let inverted = FilterContext::new().with_dates(NaiveDate::from_ymd_opt(2024, 3, 5), march_2);
        assert!(handle.set_filter(inverted).await.is_err());
        handle.close().await;
    }

    #[tokio::test]
    async fn test_switch_tenant_drops_previous_data() {
        let store = InMemoryRecordStore::new();
        let first = TenantId::new("t-1");
        let second = TenantId::new("t-2");
        seed_business(&store, &first).await;

        let handle = DashboardSession::spawn(
            Arc::new(store.clone()),
            first.clone(),
            ViewMode::Business,
            clock(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        handle.settled(SETTLE).await;

        handle.switch_tenant(second.clone()).await.unwrap();
        let view = handle
            .wait_for(SETTLE, |v| v.tenant == second && v.completeness.is_complete)
            .await;
        assert_eq!(view.business.as_ref().unwrap().global.revenue, 0);
        assert_eq!(store.live_subscriptions_for(&first).await, 0);
        assert_eq!(store.live_subscriptions_for(&second).await, 5);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_talent_mode_uses_clock_month() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("t-1");
        store
            .put(EntityKind::Talent, &tenant, Some("x".into()), json!({"name": "X", "status": "AKTIF"}))
            .await
            .unwrap();
        store
            .put(
                EntityKind::KpiTarget,
                &tenant,
                None,
                json!({"talentId": "x", "month": "Maret", "year": 2024, "targetCount": 20}),
            )
            .await
            .unwrap();
        store
            .put(
                EntityKind::TalentPosting,
                &tenant,
                None,
                json!({"talentId": "x", "postCount": 25, "date": "2024-03-10"}),
            )
            .await
            .unwrap();

        let handle = DashboardSession::spawn(
            Arc::new(store.clone()),
            tenant.clone(),
            ViewMode::Talent,
            clock(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        let view = handle.settled(SETTLE).await;
        let report = view.talent.as_ref().unwrap();
        assert_eq!(report.period, YearMonth::new(2024, 3).unwrap());
        assert_eq!(report.achievements[0].percent, 100);
        assert!(report.achievements[0].is_achieved);
        handle.close().await;
    }
}
