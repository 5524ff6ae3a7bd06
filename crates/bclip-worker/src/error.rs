//! Worker error types.

use std::time::Duration;

use bclip_models::Stage;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A pipeline stage failed; the job was aborted there.
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<WorkerError>,
    },

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] bclip_storage::StorageError),

    #[error("Database error: {0}")]
    Db(#[from] bclip_db::DbError),

    #[error("Media error: {0}")]
    Media(#[from] bclip_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] bclip_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn stage(stage: Stage, source: impl Into<WorkerError>) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source.into()),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Stage the job failed at, if the failure came from a stage.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
