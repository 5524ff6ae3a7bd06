//! Status ledger on the `job_status` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use bclip_models::{JobId, JobStatus};
use bclip_queue::{LedgerEntry, QueueResult, StatusLedger};

use crate::error::DbError;

#[derive(Clone)]
pub struct PgStatusLedger {
    pool: PgPool,
}

impl PgStatusLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusLedger for PgStatusLedger {
    async fn set_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<()> {
        let entry = LedgerEntry::new(status.clone(), ttl)?;
        sqlx::query(
            "INSERT INTO job_status (job_id, status, created_at, updated_at, expires_at) \
            VALUES ($1, $2, $3, $3, $4) \
            ON CONFLICT (job_id) DO UPDATE \
                SET status = EXCLUDED.status, \
                updated_at = EXCLUDED.updated_at, \
                expires_at = EXCLUDED.expires_at",
        )
        .bind(job_id.as_str())
        .bind(status.to_string())
        .bind(entry.updated_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(())
    }

    async fn seed_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<bool> {
        let entry = LedgerEntry::new(status.clone(), ttl)?;
        // Replaces only an expired row that cleanup has not removed yet.
        let result = sqlx::query(
            "INSERT INTO job_status (job_id, status, created_at, updated_at, expires_at) \
            VALUES ($1, $2, $3, $3, $4) \
            ON CONFLICT (job_id) DO UPDATE \
                SET status = EXCLUDED.status, \
                created_at = EXCLUDED.created_at, \
                updated_at = EXCLUDED.updated_at, \
                expires_at = EXCLUDED.expires_at \
            WHERE job_status.expires_at <= EXCLUDED.updated_at",
        )
        .bind(job_id.as_str())
        .bind(status.to_string())
        .bind(entry.updated_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM job_status WHERE job_id = $1 AND expires_at > $2",
        )
        .bind(job_id.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(status.map(|raw| JobStatus::from(raw.as_str())))
    }

    async fn cleanup(&self) -> QueueResult<u64> {
        let result = sqlx::query("DELETE FROM job_status WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(result.rows_affected())
    }
}
