//! Queue and ledger configuration.

use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Receives allowed before a message is dead-lettered; 0 = unlimited
    pub max_receives: u32,
    /// How long a received message stays invisible to other receivers
    pub visibility_timeout: Duration,
    /// Long-poll wait when the queue is empty
    pub wait_time: Duration,
    /// Max messages per receive
    pub receive_batch: usize,
    /// Key prefix for ledger and lease keys
    pub ledger_key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "bclip:jobs".to_string(),
            consumer_group: "bclip:workers".to_string(),
            dlq_stream_name: "bclip:dlq".to_string(),
            max_receives: 0,
            visibility_timeout: Duration::from_secs(2400), // 40 minutes
            wait_time: Duration::from_secs(20),
            receive_batch: 5,
            ledger_key_prefix: "bclip:ledger".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_receives: std::env::var("QUEUE_MAX_RECEIVES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_receives),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
            wait_time: std::env::var("QUEUE_WAIT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.wait_time),
            receive_batch: std::env::var("QUEUE_RECEIVE_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.receive_batch),
            ledger_key_prefix: std::env::var("LEDGER_KEY_PREFIX")
                .unwrap_or(defaults.ledger_key_prefix),
        }
    }
}
