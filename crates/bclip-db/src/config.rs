//! Database configuration.

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Postgres connection string
    pub dsn: String,
    pub max_connections: u32,
    /// Run `setup.sql` on connect
    pub run_setup: bool,
}

impl DbConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            max_connections: 5,
            run_setup: true,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> DbResult<Self> {
        let dsn = std::env::var("DB_DSN").map_err(|_| DbError::config("DB_DSN not set"))?;
        Ok(Self {
            dsn,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            run_setup: std::env::var("DB_RUN_SETUP")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}
