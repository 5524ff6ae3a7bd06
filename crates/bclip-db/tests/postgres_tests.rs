//! Postgres integration tests.

use std::time::Duration;

use chrono::Utc;
use sqlx::Row;

use bclip_db::{DbConfig, DbHandle, PgStatusLedger, PgVideoRepository, VideoRepository};
use bclip_models::{JobId, JobStatus, Stage, VideoId, VideoStatus};
use bclip_queue::StatusLedger;

async fn connect() -> DbHandle {
    dotenvy::dotenv().ok();
    let config = DbConfig::from_env().expect("DB_DSN must be set");
    DbHandle::connect(&config).await.expect("Failed to connect")
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_ledger_round_trip_and_expiry() {
    let db = connect().await;
    let ledger = PgStatusLedger::new(db.pool().clone());
    let job = JobId::new();

    assert!(ledger
        .seed_status(&job, &JobStatus::Queued, Duration::from_secs(60))
        .await
        .unwrap());
    assert_eq!(ledger.get_status(&job).await.unwrap(), Some(JobStatus::Queued));

    ledger
        .set_status(&job, &JobStatus::Failed(Stage::Concat), Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(ledger.get_status(&job).await.unwrap(), None);
    assert!(ledger.cleanup().await.unwrap() >= 1);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_video_commit_sequence() {
    let db = connect().await;
    let repo = PgVideoRepository::new(db.pool().clone());

    let id: i64 = sqlx::query("INSERT INTO videos (title) VALUES ('integration') RETURNING id")
        .fetch_one(db.pool())
        .await
        .unwrap()
        .get("id");
    let video_id = VideoId(id);
    let at = Utc::now();

    repo.update_status(video_id, VideoStatus::Processing, at).await.unwrap();
    repo.update_processed_ref(video_id, "https://cdn/p.mp4", at).await.unwrap();
    repo.update_thumb_ref(video_id, "https://cdn/t.jpg", at).await.unwrap();
    repo.update_status(video_id, VideoStatus::Processed, at).await.unwrap();

    let record = repo.get(video_id).await.unwrap().unwrap();
    assert!(record.is_publishable());
    assert!(record.processed_at.is_some());

    let missing = repo
        .update_status(VideoId(-1), VideoStatus::Failed, at)
        .await
        .unwrap_err();
    assert!(missing.is_not_found());
}
