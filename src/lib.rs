// Tenant Rollup - live per-tenant business and talent dashboards

// Core types and primitives
pub mod core;

// Tenant-scoped records
pub mod models;

// Record stores, subscriptions and collections
pub mod infrastructure;

// Pure rollup engines
pub mod engine;

// Dashboard sessions
pub mod services;

// HTTP surface
pub mod api;

// Common utilities
pub mod app_state;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
