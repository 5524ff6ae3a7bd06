//! Bucket names and artifact keys.

use bclip_models::VideoId;

/// The two buckets the pipeline reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    /// User uploads (pipeline input)
    pub uploads: String,
    /// Processed artifacts (pipeline output)
    pub processed: String,
}

impl Buckets {
    pub fn new(uploads: impl Into<String>, processed: impl Into<String>) -> Self {
        Self {
            uploads: uploads.into(),
            processed: processed.into(),
        }
    }

    /// Bucket names from `S3_UPLOADS_BUCKET` / `S3_PROCESSED_BUCKET`, with
    /// the defaults used by the local store.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uploads: std::env::var("S3_UPLOADS_BUCKET").unwrap_or(defaults.uploads),
            processed: std::env::var("S3_PROCESSED_BUCKET").unwrap_or(defaults.processed),
        }
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self::new("uploads", "processed")
    }
}

/// Key of the final muted clip. Re-running a job overwrites it.
pub fn processed_video_key(video_id: VideoId) -> String {
    format!("processed/{}_final_noaudio.mp4", video_id)
}

/// Key of the thumbnail.
pub fn thumbnail_key(video_id: VideoId) -> String {
    format!("processed/{}_thumb.jpg", video_id)
}
