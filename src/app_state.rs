use std::sync::Arc;
use crate::{
    config::Config,
    infrastructure::clock::{Clock, SystemClock},
    infrastructure::record_store::RecordStore,
    infrastructure::sqlite_store::SqliteRecordStore,
    services::hub::DashboardHub,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub hub: Arc<DashboardHub>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize the record store
        let store = SqliteRecordStore::connect(&config.database.url).await?;
        Self::with_store(config, Arc::new(store), Arc::new(SystemClock))
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let hub = DashboardHub::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.session_config()?,
            config.hub_config(),
        );
        Ok(Self {
            store,
            hub: Arc::new(hub),
            clock,
            config,
        })
    }
}
