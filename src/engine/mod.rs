// Rollup engines - pure functions over one snapshot of tenant collections.
// Nothing in here touches shared state; callers pass the tenant explicitly.

pub mod aggregation;
pub mod filter;
pub mod kpi;

pub use aggregation::{aggregate_business, BusinessInput, BusinessRollup, GlobalTotals, ProductRollup, ShopRollup, Unattributed};
pub use filter::FilterContext;
pub use kpi::{achievement_percent, compute_kpi, talent_overview, talent_report, KpiAchievement, TalentInput, TalentOverview, TalentReport};
