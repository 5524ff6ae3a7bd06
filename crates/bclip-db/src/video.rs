//! Video repository.
//!
//! The pipeline only writes three things on a video row: its status, the
//! processed clip URL and the thumbnail URL. Each write names the timestamp
//! it happened at. Updating a missing row is [`DbError::VideoNotFound`].

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::debug;

use bclip_models::{VideoId, VideoRecord, VideoStatus};

use crate::error::{DbError, DbResult};

#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Set the status. Moving to `processed` also stamps `processed_at`.
    async fn update_status(
        &self,
        video_id: VideoId,
        status: VideoStatus,
        at: DateTime<Utc>,
    ) -> DbResult<()>;

    async fn update_processed_ref(
        &self,
        video_id: VideoId,
        url: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()>;

    async fn update_thumb_ref(&self, video_id: VideoId, url: &str, at: DateTime<Utc>)
        -> DbResult<()>;

    /// Set `failed` and clear both URLs in one write, so an aborted
    /// commit never leaves a half-published row.
    async fn mark_failed(&self, video_id: VideoId, at: DateTime<Utc>) -> DbResult<()>;

    async fn get(&self, video_id: VideoId) -> DbResult<Option<VideoRecord>>;
}

/// Repository on the `videos` table.
#[derive(Clone)]
pub struct PgVideoRepository {
    pool: PgPool,
}

impl PgVideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn expect_row(video_id: VideoId, rows_affected: u64) -> DbResult<()> {
        if rows_affected == 0 {
            return Err(DbError::VideoNotFound(video_id));
        }
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> DbResult<VideoRecord> {
        let status: String = row.try_get("status")?;
        Ok(VideoRecord {
            video_id: VideoId(row.try_get("id")?),
            status: VideoStatus::from_str(&status).map_err(DbError::InvalidRow)?,
            processed_ref: row.try_get("processed_url")?,
            thumb_ref: row.try_get("thumb_url")?,
            updated_at: row.try_get("updated_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn update_status(
        &self,
        video_id: VideoId,
        status: VideoStatus,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE videos \
                SET status = $1::text, \
                updated_at = $2, \
                processed_at = CASE WHEN $1::text = 'processed' THEN $2 ELSE processed_at END \
            WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(at)
        .bind(video_id.get())
        .execute(&self.pool)
        .await?;

        debug!(video_id = %video_id, status = %status, "Video status updated");
        Self::expect_row(video_id, result.rows_affected())
    }

    async fn update_processed_ref(
        &self,
        video_id: VideoId,
        url: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE videos SET processed_url = $1, updated_at = $2 WHERE id = $3")
            .bind(url)
            .bind(at)
            .bind(video_id.get())
            .execute(&self.pool)
            .await?;

        Self::expect_row(video_id, result.rows_affected())
    }

    async fn update_thumb_ref(
        &self,
        video_id: VideoId,
        url: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE videos SET thumb_url = $1, updated_at = $2 WHERE id = $3")
            .bind(url)
            .bind(at)
            .bind(video_id.get())
            .execute(&self.pool)
            .await?;

        Self::expect_row(video_id, result.rows_affected())
    }

    async fn mark_failed(&self, video_id: VideoId, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE videos \
                SET status = 'failed', \
                processed_url = NULL, \
                thumb_url = NULL, \
                updated_at = $1 \
            WHERE id = $2",
        )
        .bind(at)
        .bind(video_id.get())
        .execute(&self.pool)
        .await?;

        debug!(video_id = %video_id, "Video marked failed");
        Self::expect_row(video_id, result.rows_affected())
    }

    async fn get(&self, video_id: VideoId) -> DbResult<Option<VideoRecord>> {
        let row = sqlx::query(
            "SELECT id, status, processed_url, thumb_url, updated_at, processed_at \
            FROM videos WHERE id = $1",
        )
        .bind(video_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }
}

/// In-memory repository for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryVideoRepository {
    videos: RwLock<HashMap<VideoId, VideoRecord>>,
}

impl MemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly uploaded video.
    pub async fn insert_uploaded(&self, video_id: VideoId) {
        self.videos
            .write()
            .await
            .insert(video_id, VideoRecord::uploaded(video_id));
    }

    async fn modify(
        &self,
        video_id: VideoId,
        at: DateTime<Utc>,
        f: impl FnOnce(&mut VideoRecord) + Send,
    ) -> DbResult<()> {
        let mut videos = self.videos.write().await;
        let record = videos
            .get_mut(&video_id)
            .ok_or(DbError::VideoNotFound(video_id))?;
        f(record);
        record.updated_at = at;
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn update_status(
        &self,
        video_id: VideoId,
        status: VideoStatus,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.modify(video_id, at, |record| {
            record.status = status;
            if status == VideoStatus::Processed {
                record.processed_at = Some(at);
            }
        })
        .await
    }

    async fn update_processed_ref(
        &self,
        video_id: VideoId,
        url: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let url = url.to_string();
        self.modify(video_id, at, move |record| record.processed_ref = Some(url))
            .await
    }

    async fn update_thumb_ref(
        &self,
        video_id: VideoId,
        url: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let url = url.to_string();
        self.modify(video_id, at, move |record| record.thumb_ref = Some(url))
            .await
    }

    async fn mark_failed(&self, video_id: VideoId, at: DateTime<Utc>) -> DbResult<()> {
        self.modify(video_id, at, |record| {
            record.status = VideoStatus::Failed;
            record.processed_ref = None;
            record.thumb_ref = None;
        })
        .await
    }

    async fn get(&self, video_id: VideoId) -> DbResult<Option<VideoRecord>> {
        Ok(self.videos.read().await.get(&video_id).cloned())
    }
}
