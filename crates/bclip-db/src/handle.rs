use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use tracing::info;

use crate::config::DbConfig;
use crate::error::DbResult;

/// Shared connection pool.
#[derive(Clone)]
pub struct DbHandle {
    pool: PgPool,
}

impl DbHandle {
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.dsn)
            .await?;

        if config.run_setup {
            (&pool).execute(include_str!("setup.sql")).await?;
        }

        info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
