//! Video record fields touched by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of a video row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub i64);

impl VideoId {
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for VideoId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Video processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Source uploaded, not yet processed
    #[default]
    Uploaded,
    /// Pipeline is publishing artifacts
    Processing,
    /// Final clip and thumbnail are available
    Processed,
    /// Processing failed
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Processed => "processed",
            VideoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(VideoStatus::Uploaded),
            "processing" => Ok(VideoStatus::Processing),
            "processed" => Ok(VideoStatus::Processed),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(format!("unknown video status: {}", other)),
        }
    }
}

/// The slice of the video row the pipeline reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: VideoId,
    #[serde(default)]
    pub status: VideoStatus,
    /// Public URL of the processed clip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_ref: Option<String>,
    /// Public URL of the thumbnail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_ref: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
    /// Create a freshly uploaded record.
    pub fn uploaded(video_id: VideoId) -> Self {
        Self {
            video_id,
            status: VideoStatus::Uploaded,
            processed_ref: None,
            thumb_ref: None,
            updated_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Artifact references are only meaningful once the video is processed.
    pub fn is_publishable(&self) -> bool {
        self.status == VideoStatus::Processed
            && self.processed_ref.is_some()
            && self.thumb_ref.is_some()
    }
}
