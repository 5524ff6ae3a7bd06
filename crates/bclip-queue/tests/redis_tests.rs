//! Redis queue, ledger and lease integration tests.

use std::sync::Arc;
use std::time::Duration;

use bclip_models::{JobId, JobStatus, Stage, UserId, VideoId};
use bclip_queue::{
    JobEnqueuer, JobLease, QueueConfig, QueueTransport, ReceiveOptions, RedisJobLease,
    RedisStatusLedger, RedisStreamQueue, StatusLedger,
};

/// Config with stream and key names unique to this test run.
fn test_config(name: &str) -> QueueConfig {
    dotenvy::dotenv().ok();
    let run = JobId::new();
    let mut config = QueueConfig::from_env();
    config.stream_name = format!("bclip:test:{}:{}:jobs", name, run);
    config.dlq_stream_name = format!("bclip:test:{}:{}:dlq", name, run);
    config.ledger_key_prefix = format!("bclip:test:{}:{}:ledger", name, run);
    config
}

fn quick(visibility: Duration) -> ReceiveOptions {
    ReceiveOptions {
        max_messages: 5,
        wait: Duration::from_millis(200),
        visibility_timeout: visibility,
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_receive_delete() {
    let config = test_config("cycle");
    let queue = Arc::new(RedisStreamQueue::new(config.clone(), "test-consumer").expect("queue"));
    queue.init().await.expect("Failed to initialize queue");
    let ledger = Arc::new(RedisStatusLedger::from_config(&config).expect("ledger"));

    let enqueuer = JobEnqueuer::new(queue.clone(), ledger.clone());
    let job_id = enqueuer
        .enqueue(VideoId(42), UserId(7), "Dunk", "uploads/42.mp4")
        .await
        .expect("Failed to enqueue");
    assert_eq!(enqueuer.status(&job_id).await.unwrap(), Some(JobStatus::Queued));

    let messages = queue.receive(&quick(Duration::from_secs(60))).await.expect("receive");
    assert_eq!(messages.len(), 1);
    let message = &messages[0];
    assert_eq!(message.receive_count, 1);
    assert_eq!(message.attributes.video_id, Some(42));
    assert_eq!(message.parse_job().unwrap().job_id, job_id);

    queue.delete(&message.receipt).await.expect("delete");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_unacked_message_redelivers_after_visibility_timeout() {
    let config = test_config("redeliver");
    let first = RedisStreamQueue::new(config.clone(), "consumer-a").expect("queue");
    let second = RedisStreamQueue::new(config.clone(), "consumer-b").expect("queue");
    first.init().await.expect("init");

    first
        .publish("{}", &Default::default())
        .await
        .expect("publish");

    let visibility = Duration::from_millis(300);
    let got = first.receive(&quick(visibility)).await.unwrap();
    assert_eq!(got.len(), 1);

    // Invisible to the other consumer while in flight.
    assert!(second
        .receive(&ReceiveOptions { wait: Duration::ZERO, ..quick(visibility) })
        .await
        .unwrap()
        .is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let again = second.receive(&quick(visibility)).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].message_id, got[0].message_id);
    assert_eq!(again[0].receive_count, 2);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dead_letter_moves_message() {
    let config = test_config("dlq");
    let queue = RedisStreamQueue::new(config, "test-consumer").expect("queue");
    queue.init().await.expect("init");

    queue.publish("not json", &Default::default()).await.unwrap();
    let message = queue
        .receive(&quick(Duration::from_secs(60)))
        .await
        .unwrap()
        .remove(0);

    queue.dead_letter(&message, "poison").await.expect("dead letter");
    assert_eq!(queue.len().await.unwrap(), 0);
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_ledger_expiry_and_cleanup() {
    let config = test_config("ledger");
    let ledger = RedisStatusLedger::from_config(&config).expect("ledger");
    let job = JobId::new();

    ledger
        .set_status(&job, &JobStatus::Processing(Stage::Trim), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(
        ledger.get_status(&job).await.unwrap(),
        Some(JobStatus::Processing(Stage::Trim))
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(ledger.get_status(&job).await.unwrap(), None);
    assert_eq!(ledger.cleanup().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_lease_is_exclusive() {
    let config = test_config("lease");
    let lease = RedisJobLease::from_config(&config).expect("lease");
    let job = JobId::new();
    let ttl = Duration::from_secs(30);

    assert!(lease.try_acquire(&job, "a", ttl).await.unwrap());
    assert!(!lease.try_acquire(&job, "b", ttl).await.unwrap());
    lease.release(&job, "b").await.unwrap();
    assert!(!lease.try_acquire(&job, "b", ttl).await.unwrap());
    lease.release(&job, "a").await.unwrap();
    assert!(lease.try_acquire(&job, "b", ttl).await.unwrap());
}
