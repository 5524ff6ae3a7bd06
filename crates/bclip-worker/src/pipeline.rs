//! Transform pipeline.
//!
//! Stages run strictly in order and each one reads the previous stage's
//! output file. The first failing stage aborts the job; nothing is resumed
//! on redelivery, every attempt starts from a fresh workspace.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Instrument;

use bclip_media::{
    concat_command, mute_command, run_checked, scale_to_canvas_command, thumbnail_command,
    trim_command, write_concat_list, StageRunner,
};
use bclip_models::{ProcessVideoJob, Stage, JOB_STATUS_TTL};
use bclip_queue::StatusLedger;
use bclip_storage::{BlobStore, Buckets};

use crate::dispatcher::JobHandler;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::publisher::{PublishedRefs, ResultPublisher};
use crate::tracker::StageTracker;
use crate::workspace::ScratchWorkspace;

pub struct TransformPipeline {
    runner: Arc<dyn StageRunner>,
    store: Arc<dyn BlobStore>,
    buckets: Buckets,
    ledger: Arc<dyn StatusLedger>,
    publisher: ResultPublisher,
    work_root: PathBuf,
    intro_path: PathBuf,
    outro_path: PathBuf,
    status_ttl: Duration,
}

impl TransformPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: Arc<dyn StageRunner>,
        store: Arc<dyn BlobStore>,
        buckets: Buckets,
        ledger: Arc<dyn StatusLedger>,
        publisher: ResultPublisher,
        work_root: impl Into<PathBuf>,
        intro_path: impl Into<PathBuf>,
        outro_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            store,
            buckets,
            ledger,
            publisher,
            work_root: work_root.into(),
            intro_path: intro_path.into(),
            outro_path: outro_path.into(),
            status_ttl: JOB_STATUS_TTL,
        }
    }

    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    /// Run every stage for `job`. The scratch workspace is gone when this returns.
    pub async fn run(&self, job: &ProcessVideoJob) -> WorkerResult<PublishedRefs> {
        let tracker = StageTracker::new(self.ledger.clone(), job).with_status_ttl(self.status_ttl);
        let span = tracker.logger().create_span();
        self.run_tracked(job, &tracker).instrument(span).await
    }

    async fn run_tracked(
        &self,
        job: &ProcessVideoJob,
        tracker: &StageTracker,
    ) -> WorkerResult<PublishedRefs> {
        let started = Instant::now();

        let t = tracker.begin(Stage::CreateWorkdir).await;
        let r = ScratchWorkspace::allocate(&self.work_root, job.video_id, &job.job_id);
        let workspace = tracker.finish(t, r).await?;

        let result = self.run_stages(job, &workspace, tracker).await;

        if let Err(e) = workspace.release() {
            tracker
                .logger()
                .log_warning(&format!("failed to remove scratch workspace: {}", e));
        }

        let refs = result?;
        tracker.done().await;
        tracker.logger().log_completion(started.elapsed().as_secs_f64());
        Ok(refs)
    }

    async fn run_stages(
        &self,
        job: &ProcessVideoJob,
        ws: &ScratchWorkspace,
        tracker: &StageTracker,
    ) -> WorkerResult<PublishedRefs> {
        let runner = self.runner.as_ref();

        let t = tracker.begin(Stage::DownloadOriginal).await;
        let r = self
            .store
            .download_file(&self.buckets.uploads, &job.input_ref, &ws.original())
            .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::Trim).await;
        let r = run_checked(runner, &trim_command(ws.original(), ws.trimmed())).await;
        tracker.finish(t, r).await?;

        // Thumbnail comes from the untrimmed source.
        let t = tracker.begin(Stage::Thumb).await;
        let r = run_checked(runner, &thumbnail_command(ws.original(), ws.thumbnail())).await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::ScaleMain).await;
        let r = run_checked(runner, &scale_to_canvas_command(ws.trimmed(), ws.scaled_main())).await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::ScaleIntro).await;
        let r = run_checked(
            runner,
            &scale_to_canvas_command(&self.intro_path, ws.scaled_intro()),
        )
        .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::ScaleOutro).await;
        let r = run_checked(
            runner,
            &scale_to_canvas_command(&self.outro_path, ws.scaled_outro()),
        )
        .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::Concat).await;
        let r = async {
            let segments = [ws.scaled_intro(), ws.scaled_main(), ws.scaled_outro()];
            let segments: Vec<&std::path::Path> = segments.iter().map(|p| p.as_path()).collect();
            write_concat_list(ws.concat_list(), &segments).await?;
            run_checked(runner, &concat_command(ws.concat_list(), ws.concatenated())).await
        }
        .await;
        tracker.finish(t, r).await?;

        let t = tracker.begin(Stage::Mute).await;
        let r = run_checked(runner, &mute_command(ws.concatenated(), ws.muted())).await;
        tracker.finish(t, r).await?;

        self.publisher
            .publish(job, &ws.muted(), &ws.thumbnail(), tracker)
            .await
    }
}

#[async_trait]
impl JobHandler for TransformPipeline {
    async fn handle(&self, job: &ProcessVideoJob) -> WorkerResult<()> {
        self.run(job).await.map(|_| ())
    }

    /// A deadline inside the commit phase may have left the video
    /// `processing` with a partial URL set.
    async fn on_timeout(&self, job: &ProcessVideoJob, stage: Option<Stage>) {
        if stage.is_some_and(|s| s.is_publish_phase()) {
            self.publisher.mark_failed(job, &JobLogger::new(job)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bclip_db::{MemoryVideoRepository, VideoRepository};
    use bclip_media::{FfmpegCommand, MediaResult, ToolOutput};
    use bclip_models::{JobStatus, UserId, VideoId, VideoStatus};
    use bclip_queue::MemoryStatusLedger;
    use bclip_storage::LocalBlobStore;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fake media tool: records each output file name and writes it.
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(output: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(output),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StageRunner for RecordingRunner {
        async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
            let name = cmd
                .output()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string();
            self.calls.lock().unwrap().push(name.clone());
            if self.fail_on == Some(name.as_str()) {
                return Ok(ToolOutput::failed(1, "synthetic failure"));
            }
            tokio::fs::write(cmd.output(), name.as_bytes()).await?;
            Ok(ToolOutput::success())
        }
    }

    struct Fixture {
        _dir: TempDir,
        work_root: PathBuf,
        store: Arc<LocalBlobStore>,
        ledger: Arc<MemoryStatusLedger>,
        videos: Arc<MemoryVideoRepository>,
        job: ProcessVideoJob,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let work_root = dir.path().join("work");
        let store = Arc::new(LocalBlobStore::new(dir.path().join("blobs")));

        let source = dir.path().join("source.mp4");
        tokio::fs::write(&source, b"sixty seconds of video").await.unwrap();
        store
            .upload_file("uploads", "uploads/42.mp4", &source, "video/mp4")
            .await
            .unwrap();

        let videos = Arc::new(MemoryVideoRepository::new());
        videos.insert_uploaded(VideoId(42)).await;

        Fixture {
            work_root,
            store,
            ledger: Arc::new(MemoryStatusLedger::new()),
            videos,
            job: ProcessVideoJob::new(VideoId(42), UserId(7), "Dunk", "uploads/42.mp4"),
            _dir: dir,
        }
    }

    fn pipeline(fx: &Fixture, runner: Arc<RecordingRunner>) -> TransformPipeline {
        let buckets = Buckets::new("uploads", "processed");
        let publisher = ResultPublisher::new(fx.store.clone(), buckets.clone(), fx.videos.clone());
        TransformPipeline::new(
            runner,
            fx.store.clone(),
            buckets,
            fx.ledger.clone(),
            publisher,
            &fx.work_root,
            "/assets/intro.mp4",
            "/assets/outro.mp4",
        )
    }

    fn workspaces_left(root: &std::path::Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let fx = fixture().await;
        let runner = Arc::new(RecordingRunner::new());
        let refs = pipeline(&fx, runner.clone()).run(&fx.job).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "video_trim.mp4",
                "thumb.jpg",
                "video_720p.mp4",
                "intro_720.mp4",
                "outro_720.mp4",
                "final.mp4",
                "final_noaudio.mp4",
            ]
        );

        assert_eq!(
            fx.ledger.get_status(&fx.job.job_id).await.unwrap(),
            Some(JobStatus::Done)
        );

        let record = fx.videos.get(VideoId(42)).await.unwrap().unwrap();
        assert_eq!(record.status, VideoStatus::Processed);
        assert_eq!(record.processed_ref.as_deref(), Some(refs.processed_ref.as_str()));
        assert!(refs.processed_ref.ends_with("processed/42_final_noaudio.mp4"));
        assert!(refs.thumb_ref.ends_with("processed/42_thumb.jpg"));
        assert!(fx.store.exists("processed", "processed/42_final_noaudio.mp4").await);
        assert!(fx.store.exists("processed", "processed/42_thumb.jpg").await);

        assert_eq!(workspaces_left(&fx.work_root), 0);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_stages() {
        let fx = fixture().await;
        let runner = Arc::new(RecordingRunner::failing_on("video_720p.mp4"));
        let err = pipeline(&fx, runner.clone()).run(&fx.job).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::ScaleMain));
        assert_eq!(
            runner.calls(),
            vec!["video_trim.mp4", "thumb.jpg", "video_720p.mp4"]
        );
        assert_eq!(
            fx.ledger.get_status(&fx.job.job_id).await.unwrap(),
            Some(JobStatus::Failed(Stage::ScaleMain))
        );

        // Nothing published, the record is untouched.
        let record = fx.videos.get(VideoId(42)).await.unwrap().unwrap();
        assert_eq!(record.status, VideoStatus::Uploaded);
        assert!(record.processed_ref.is_none());
        assert_eq!(workspaces_left(&fx.work_root), 0);
    }

    #[tokio::test]
    async fn test_missing_source_fails_download() {
        let mut fx = fixture().await;
        fx.job.input_ref = "uploads/missing.mp4".into();
        let runner = Arc::new(RecordingRunner::new());
        let err = pipeline(&fx, runner.clone()).run(&fx.job).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::DownloadOriginal));
        assert!(runner.calls().is_empty());
        assert_eq!(workspaces_left(&fx.work_root), 0);
    }

    #[tokio::test]
    async fn test_rerun_after_failure_starts_from_the_top() {
        let fx = fixture().await;
        let failing = Arc::new(RecordingRunner::failing_on("final_noaudio.mp4"));
        pipeline(&fx, failing).run(&fx.job).await.unwrap_err();

        let runner = Arc::new(RecordingRunner::new());
        pipeline(&fx, runner.clone()).run(&fx.job).await.unwrap();

        assert_eq!(runner.calls().len(), 7);
        assert_eq!(runner.calls()[0], "video_trim.mp4");
        assert_eq!(
            fx.ledger.get_status(&fx.job.job_id).await.unwrap(),
            Some(JobStatus::Done)
        );
    }

    #[tokio::test]
    async fn test_commit_failure_marks_video_failed() {
        let fx = fixture().await;
        let mut job = fx.job.clone();
        // Source exists but the video row does not.
        job.video_id = VideoId(43);
        let runner = Arc::new(RecordingRunner::new());
        let err = pipeline(&fx, runner).run(&job).await.unwrap_err();

        assert_eq!(err.failed_stage(), Some(Stage::UpdateStatusProcessing));
        assert_eq!(
            fx.ledger.get_status(&job.job_id).await.unwrap(),
            Some(JobStatus::Failed(Stage::UpdateStatusProcessing))
        );
        assert!(!fx.store.exists("processed", "processed/43_final_noaudio.mp4").await);
    }

    #[tokio::test]
    async fn test_timeout_during_commit_marks_video_failed() {
        let fx = fixture().await;
        let pipeline = pipeline(&fx, Arc::new(RecordingRunner::new()));
        let at = chrono::Utc::now();
        fx.videos
            .update_status(VideoId(42), VideoStatus::Processing, at)
            .await
            .unwrap();
        fx.videos
            .update_processed_ref(VideoId(42), "https://cdn/42.mp4", at)
            .await
            .unwrap();

        pipeline.on_timeout(&fx.job, Some(Stage::UpdateThumbUrl)).await;

        let record = fx.videos.get(VideoId(42)).await.unwrap().unwrap();
        assert_eq!(record.status, VideoStatus::Failed);
        assert!(record.processed_ref.is_none());
        assert!(record.thumb_ref.is_none());
    }

    #[tokio::test]
    async fn test_timeout_before_commit_leaves_video_alone() {
        let fx = fixture().await;
        let pipeline = pipeline(&fx, Arc::new(RecordingRunner::new()));

        pipeline.on_timeout(&fx.job, Some(Stage::Concat)).await;
        pipeline.on_timeout(&fx.job, None).await;

        let record = fx.videos.get(VideoId(42)).await.unwrap().unwrap();
        assert_eq!(record.status, VideoStatus::Uploaded);
    }
}
