use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::services::dashboard::SessionConfig;
use crate::services::hub::HubConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Offset of the wall clock that day and month boundaries follow
    pub utc_offset_minutes: i32,
    pub channel_capacity: usize,
    pub settle_timeout_ms: u64,
    pub max_sessions: usize,
    /// 0 disables idle eviction
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/tenant_rollup.db".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            dashboard: DashboardConfig {
                utc_offset_minutes: 0,
                channel_capacity: 256,
                settle_timeout_ms: 2000,
                max_sessions: 64,
                idle_timeout_secs: 600,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/tenant_rollup.db".to_string()),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            dashboard: DashboardConfig {
                utc_offset_minutes: env::var("DASHBOARD_UTC_OFFSET_MINUTES")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse()
                    .unwrap_or(0),
                channel_capacity: env::var("DASHBOARD_CHANNEL_CAPACITY")
                    .unwrap_or_else(|_| "256".to_string())
                    .parse()
                    .unwrap_or(256),
                settle_timeout_ms: env::var("DASHBOARD_SETTLE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .unwrap_or(2000),
                max_sessions: env::var("DASHBOARD_MAX_SESSIONS")
                    .unwrap_or_else(|_| "64".to_string())
                    .parse()
                    .unwrap_or(64),
                idle_timeout_secs: env::var("DASHBOARD_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .unwrap_or(600),
            },
        };
        config.utc_offset()?;
        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn utc_offset(&self) -> AppResult<FixedOffset> {
        let minutes = self.dashboard.utc_offset_minutes;
        FixedOffset::east_opt(minutes.saturating_mul(60)).ok_or_else(|| {
            AppError::ConfigurationError(format!(
                "DASHBOARD_UTC_OFFSET_MINUTES out of range: {}",
                minutes
            ))
        })
    }

    pub fn session_config(&self) -> AppResult<SessionConfig> {
        Ok(SessionConfig {
            utc_offset: self.utc_offset()?,
            channel_capacity: self.dashboard.channel_capacity.max(1),
            settle_timeout: Duration::from_millis(self.dashboard.settle_timeout_ms),
        })
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_sessions: self.dashboard.max_sessions.max(1),
            idle_timeout: match self.dashboard.idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}
