// Record stores, subscriptions and the per-tenant collections they feed
pub mod clock;                 // Injected "now"
pub mod collections;           // Typed per-tenant collections and their status
pub mod memory_store;          // In-process record store
pub mod record_store;          // Record store trait and live queries
pub mod sqlite_store;          // SQLite-backed record store
pub mod subscription_manager;  // Scope-bound live subscriptions

pub use clock::{Clock, FixedClock, SystemClock};
pub use collections::{CollectionStatus, Collections, DataCompleteness, FailedCollection};
pub use memory_store::InMemoryRecordStore;
pub use record_store::{RecordQuery, RecordStore, RecordStream};
pub use sqlite_store::SqliteRecordStore;
pub use subscription_manager::{CollectionChanged, SubscriptionManager};
