//! Enqueue-to-publish scenarios on in-memory backends with a fake media tool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use bclip_db::{MemoryVideoRepository, VideoRepository};
use bclip_media::{FfmpegCommand, MediaResult, StageRunner, ToolOutput};
use bclip_models::{JobStatus, Stage, UserId, VideoId, VideoStatus};
use bclip_queue::{
    JobEnqueuer, MemoryJobLease, MemoryQueue, MemoryStatusLedger, ReceiveOptions, StatusLedger,
};
use bclip_storage::{BlobStore, Buckets, LocalBlobStore};
use bclip_worker::{Disposition, Dispatcher, DispatcherConfig, ResultPublisher, TransformPipeline};

/// Writes every requested output and records the argument lists.
#[derive(Default)]
struct FakeFfmpeg {
    invocations: Mutex<Vec<Vec<String>>>,
    fail_output: Mutex<Option<String>>,
}

impl FakeFfmpeg {
    fn fail_on(&self, output: &str) {
        *self.fail_output.lock().unwrap() = Some(output.to_string());
    }

    fn clear_failure(&self) {
        *self.fail_output.lock().unwrap() = None;
    }

    fn outputs(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|args| {
                Path::new(args.last().unwrap())
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect()
    }
}

#[async_trait]
impl StageRunner for FakeFfmpeg {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
        self.invocations.lock().unwrap().push(cmd.build_args());
        let name = cmd.output().file_name().unwrap().to_string_lossy().to_string();
        if self.fail_output.lock().unwrap().as_deref() == Some(name.as_str()) {
            return Ok(ToolOutput::failed(1, "Invalid data found when processing input"));
        }
        tokio::fs::write(cmd.output(), format!("output of {}", name)).await?;
        Ok(ToolOutput::success())
    }
}

struct World {
    _dir: TempDir,
    work_root: PathBuf,
    queue: Arc<MemoryQueue>,
    ledger: Arc<MemoryStatusLedger>,
    videos: Arc<MemoryVideoRepository>,
    store: Arc<LocalBlobStore>,
    ffmpeg: Arc<FakeFfmpeg>,
    enqueuer: JobEnqueuer,
    dispatcher: Dispatcher,
}

async fn world() -> World {
    let dir = TempDir::new().unwrap();
    let work_root = dir.path().join("scratch");
    let store = Arc::new(
        LocalBlobStore::new(dir.path().join("blobs"))
            .with_public_base_url("https://cdn.example.com"),
    );

    // A 60 second upload; the fake tool never reads it.
    let source = dir.path().join("upload.mp4");
    tokio::fs::write(&source, vec![0u8; 4096]).await.unwrap();
    store
        .upload_file("uploads", "uploads/42/source.mp4", &source, "video/mp4")
        .await
        .unwrap();

    let videos = Arc::new(MemoryVideoRepository::new());
    videos.insert_uploaded(VideoId(42)).await;

    let queue = Arc::new(MemoryQueue::new());
    let ledger = Arc::new(MemoryStatusLedger::new());
    let ffmpeg = Arc::new(FakeFfmpeg::default());
    let buckets = Buckets::default();

    let publisher = ResultPublisher::new(store.clone(), buckets.clone(), videos.clone());
    let pipeline = TransformPipeline::new(
        ffmpeg.clone(),
        store.clone(),
        buckets,
        ledger.clone(),
        publisher,
        &work_root,
        "/assets/intro.mp4",
        "/assets/outro.mp4",
    );

    let config = DispatcherConfig {
        receive: ReceiveOptions {
            max_messages: 5,
            wait: Duration::ZERO,
            visibility_timeout: Duration::from_secs(60),
        },
        ..DispatcherConfig::default()
    };
    let dispatcher = Dispatcher::new(
        queue.clone(),
        Arc::new(pipeline),
        Arc::new(MemoryJobLease::new()),
        ledger.clone(),
        config,
    );

    World {
        enqueuer: JobEnqueuer::new(queue.clone(), ledger.clone()),
        _dir: dir,
        work_root,
        queue,
        ledger,
        videos,
        store,
        ffmpeg,
        dispatcher,
    }
}

fn scratch_entries(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_video_42_is_processed_end_to_end() {
    let w = world().await;

    let job_id = w
        .enqueuer
        .enqueue(VideoId(42), UserId(7), "Buzzer beater", "uploads/42/source.mp4")
        .await
        .unwrap();
    assert_eq!(w.enqueuer.status(&job_id).await.unwrap(), Some(JobStatus::Queued));

    let outcomes = w.dispatcher.poll_once().await.unwrap();
    assert_eq!(outcomes, vec![Disposition::Completed]);

    let record = w.videos.get(VideoId(42)).await.unwrap().unwrap();
    assert_eq!(record.status, VideoStatus::Processed);
    assert!(record.is_publishable());
    assert_eq!(
        record.processed_ref.as_deref(),
        Some("https://cdn.example.com/processed/processed/42_final_noaudio.mp4")
    );
    assert_eq!(
        record.thumb_ref.as_deref(),
        Some("https://cdn.example.com/processed/processed/42_thumb.jpg")
    );
    assert!(record.processed_at.is_some());

    assert_eq!(w.ledger.get_status(&job_id).await.unwrap(), Some(JobStatus::Done));
    assert!(w.queue.is_empty().await);
    assert_eq!(scratch_entries(&w.work_root), 0);
    assert!(w.store.exists("processed", "processed/42_final_noaudio.mp4").await);
}

#[tokio::test]
async fn test_tool_arguments_follow_stage_contracts() {
    let w = world().await;
    w.enqueuer
        .enqueue(VideoId(42), UserId(7), "t", "uploads/42/source.mp4")
        .await
        .unwrap();
    w.dispatcher.poll_once().await.unwrap();

    let invocations = w.ffmpeg.invocations.lock().unwrap().clone();
    assert_eq!(invocations.len(), 7);

    let trim = &invocations[0];
    assert!(trim.windows(2).any(|pair| pair == ["-t", "30"]));
    assert!(trim.windows(2).any(|pair| pair == ["-c", "copy"]));

    let thumb = &invocations[1];
    assert!(thumb[thumb.iter().position(|a| a == "-i").unwrap() + 1].ends_with("original.mp4"));
    assert!(thumb.windows(2).any(|pair| pair == ["-vframes", "1"]));

    for scale in &invocations[2..5] {
        assert!(scale.iter().any(|a| a.contains("pad=1280:720:(ow-iw)/2:(oh-ih)/2")));
    }
    assert!(invocations[3].iter().any(|a| a == "/assets/intro.mp4"));
    assert!(invocations[4].iter().any(|a| a == "/assets/outro.mp4"));

    let concat = &invocations[5];
    assert!(concat.windows(2).any(|pair| pair == ["-f", "concat"]));

    let mute = &invocations[6];
    assert!(mute.iter().any(|a| a == "-an"));
    assert!(mute.windows(2).any(|pair| pair == ["-c:v", "copy"]));
}

#[tokio::test]
async fn test_failed_stage_is_redelivered_and_rerun_from_fetch() {
    let w = world().await;
    w.ffmpeg.fail_on("final.mp4");

    let job_id = w
        .enqueuer
        .enqueue(VideoId(42), UserId(7), "t", "uploads/42/source.mp4")
        .await
        .unwrap();

    let outcomes = w.dispatcher.poll_once().await.unwrap();
    assert_eq!(
        outcomes,
        vec![Disposition::Failed {
            stage: Some(Stage::Concat)
        }]
    );
    assert_eq!(
        w.ledger.get_status(&job_id).await.unwrap(),
        Some(JobStatus::Failed(Stage::Concat))
    );
    assert!(!w.queue.is_empty().await);
    assert_eq!(scratch_entries(&w.work_root), 0);
    assert_eq!(
        w.videos.get(VideoId(42)).await.unwrap().unwrap().status,
        VideoStatus::Uploaded
    );

    // Message still invisible; nothing to receive.
    assert!(w.dispatcher.poll_once().await.unwrap().is_empty());

    w.ffmpeg.clear_failure();
    w.queue.expire_visibility().await;
    let outcomes = w.dispatcher.poll_once().await.unwrap();
    assert_eq!(outcomes, vec![Disposition::Completed]);

    let outputs = w.ffmpeg.outputs();
    assert_eq!(outputs.len(), 6 + 7);
    assert_eq!(outputs[6], "video_trim.mp4");
    assert_eq!(w.ledger.get_status(&job_id).await.unwrap(), Some(JobStatus::Done));
    assert!(w.queue.is_empty().await);
}

#[tokio::test]
async fn test_missing_upload_fails_at_download() {
    let w = world().await;
    let job_id = w
        .enqueuer
        .enqueue(VideoId(42), UserId(7), "t", "uploads/42/gone.mp4")
        .await
        .unwrap();

    let outcomes = w.dispatcher.poll_once().await.unwrap();

    assert_eq!(
        outcomes,
        vec![Disposition::Failed {
            stage: Some(Stage::DownloadOriginal)
        }]
    );
    assert_eq!(
        w.ledger.get_status(&job_id).await.unwrap(),
        Some(JobStatus::Failed(Stage::DownloadOriginal))
    );
    assert!(w.ffmpeg.outputs().is_empty());
}
