//! Queue error types.

use bclip_models::JobId;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// The message was published but its `queued` status could not be seeded.
    #[error("Job {job_id} was published but its status could not be recorded: {source}")]
    StatusSeedFailed {
        job_id: JobId,
        #[source]
        source: Box<QueueError>,
    },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Lease error: {0}")]
    Lease(String),

    #[error("Invalid message {message_id}: {reason}")]
    InvalidMessage { message_id: String, reason: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn lease(msg: impl Into<String>) -> Self {
        Self::Lease(msg.into())
    }

    pub fn invalid_message(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message_id: message_id.into(),
            reason: reason.into(),
        }
    }

    /// Job id carried by a partially successful enqueue.
    pub fn orphaned_job_id(&self) -> Option<&JobId> {
        match self {
            Self::StatusSeedFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}
