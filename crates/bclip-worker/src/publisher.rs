//! Result publisher.
//!
//! Uploads the final clip and thumbnail and commits them to the video
//! record. The record says `processing` for the whole upload phase and
//! only turns `processed` after both URLs are stored.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use bclip_db::VideoRepository;
use bclip_models::{ProcessVideoJob, Stage, VideoStatus};
use bclip_storage::{processed_video_key, thumbnail_key, BlobStore, Buckets};

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::tracker::StageTracker;

/// Public URLs of the published artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRefs {
    pub processed_ref: String,
    pub thumb_ref: String,
}

pub struct ResultPublisher {
    store: Arc<dyn BlobStore>,
    buckets: Buckets,
    videos: Arc<dyn VideoRepository>,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn BlobStore>, buckets: Buckets, videos: Arc<dyn VideoRepository>) -> Self {
        Self {
            store,
            buckets,
            videos,
        }
    }

    /// Upload and commit. On failure the video is marked `failed`, best-effort.
    pub async fn publish(
        &self,
        job: &ProcessVideoJob,
        final_clip: &Path,
        thumbnail: &Path,
        tracker: &StageTracker,
    ) -> WorkerResult<PublishedRefs> {
        let result = self.commit(job, final_clip, thumbnail, tracker).await;
        if result.is_err() {
            self.mark_failed(job, tracker.logger()).await;
        }
        result
    }

    async fn commit(
        &self,
        job: &ProcessVideoJob,
        final_clip: &Path,
        thumbnail: &Path,
        tracker: &StageTracker,
    ) -> WorkerResult<PublishedRefs> {
        let video_id = job.video_id;
        let bucket = &self.buckets.processed;
        let clip_key = processed_video_key(video_id);
        let thumb_key = thumbnail_key(video_id);

        let t = tracker.begin(Stage::UpdateStatusProcessing).await;
        let r = self
            .videos
            .update_status(video_id, VideoStatus::Processing, Utc::now())
            .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::UploadProcessed).await;
        let r = self
            .store
            .upload_file(bucket, &clip_key, final_clip, "video/mp4")
            .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::UploadThumb).await;
        let r = self
            .store
            .upload_file(bucket, &thumb_key, thumbnail, "image/jpeg")
            .await;
        tracker.finish(t, r).await?;

        let refs = PublishedRefs {
            processed_ref: self.store.public_url(bucket, &clip_key),
            thumb_ref: self.store.public_url(bucket, &thumb_key),
        };

        let t = tracker.begin(Stage::UpdateProcessedUrl).await;
        let r = self
            .videos
            .update_processed_ref(video_id, &refs.processed_ref, Utc::now())
            .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::UpdateThumbUrl).await;
        let r = self
            .videos
            .update_thumb_ref(video_id, &refs.thumb_ref, Utc::now())
            .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::UpdateStatusProcessed).await;
        let r = self
            .videos
            .update_status(video_id, VideoStatus::Processed, Utc::now())
            .await;
        tracker.finish(t, r).await?;

        Ok(refs)
    }

    /// Best-effort: mark the video `failed` and drop any URL the aborted
    /// commit already stored.
    pub async fn mark_failed(&self, job: &ProcessVideoJob, logger: &JobLogger) {
        if let Err(e) = self.videos.mark_failed(job.video_id, Utc::now()).await {
            logger.log_warning(&format!("could not mark video failed: {}", e));
        }
    }
}
