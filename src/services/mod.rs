pub mod dashboard;
pub mod hub;

pub use dashboard::{DashboardCommand, DashboardHandle, DashboardSession, DashboardView, SessionConfig, ViewMode};
pub use hub::{DashboardHub, HubConfig};
