//! Database error types.

use bclip_models::VideoId;
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Video not found: {0}")]
    VideoNotFound(VideoId),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::VideoNotFound(_))
    }
}

impl From<DbError> for bclip_queue::QueueError {
    fn from(e: DbError) -> Self {
        bclip_queue::QueueError::ledger(e.to_string())
    }
}
