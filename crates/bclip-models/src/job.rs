//! Job definitions for queue processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::VideoId;

/// Unique identifier for a job.
///
/// Random v4 UUIDs, so identifiers stay unique across processes and
/// deployments without coordination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Owner of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job to turn an uploaded video into a broadcast clip.
///
/// Created once by the enqueuer and read-only afterwards. The job has no
/// table of its own: its identity lives in the queue message and the
/// ledger key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessVideoJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Video being processed
    pub video_id: VideoId,
    /// Owner of the video
    pub user_id: UserId,
    /// Display title, copied for convenience
    #[serde(default)]
    pub title: String,
    /// Key of the source blob in the uploads bucket
    #[serde(alias = "input_path")]
    pub input_ref: String,
    /// When the job was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ProcessVideoJob {
    /// Create a new job with a fresh ID.
    pub fn new(
        video_id: VideoId,
        user_id: UserId,
        title: impl Into<String>,
        input_ref: impl Into<String>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            user_id,
            title: title.into(),
            input_ref: input_ref.into(),
            created_at: Utc::now(),
        }
    }
}
