// Core types and primitives shared by the store, the engines and the services

pub mod strong_types;

pub use strong_types::{ProductId, RecordId, ShopId, TalentId, TenantId, YearMonth};
