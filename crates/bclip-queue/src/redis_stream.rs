//! Queue transport on Redis Streams.
//!
//! One consumer group shares the stream. Delivered but unacknowledged
//! entries sit in the group's pending list; once an entry has been idle for
//! longer than the visibility timeout any consumer may claim it, which is
//! how redelivery happens. Acknowledgement is `XACK` followed by `XDEL`.

use async_trait::async_trait;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::transport::{
    MessageAttributes, QueueMessage, QueueTransport, ReceiptHandle, ReceiveOptions,
};

const FIELD_BODY: &str = "body";
const FIELD_JOB_TYPE: &str = "job_type";
const FIELD_VIDEO_ID: &str = "video_id";

/// Redis Streams queue client.
pub struct RedisStreamQueue {
    client: redis::Client,
    config: QueueConfig,
    consumer_name: String,
}

impl RedisStreamQueue {
    /// Create a new queue client. `consumer_name` must be unique per worker process.
    pub fn new(config: QueueConfig, consumer_name: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            consumer_name: consumer_name.into(),
        })
    }

    /// Create from environment variables.
    pub fn from_env(consumer_name: impl Into<String>) -> QueueResult<Self> {
        Self::new(QueueConfig::from_env(), consumer_name)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Initialize the queue (create consumer group if not exists).
    ///
    /// The group starts at the beginning of the stream so messages published
    /// before the first worker came up are still delivered.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Claim entries other deliveries left idle past the visibility timeout.
    async fn reclaim_expired(&self, options: &ReceiveOptions) -> QueueResult<Vec<QueueMessage>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let min_idle_ms = options.visibility_timeout.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(options.max_messages)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut claim = redis::cmd("XCLAIM");
        claim
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            claim.arg(&entry.id);
        }
        let claimed: StreamClaimReply = claim.query_async(&mut conn).await?;

        let messages = claimed
            .ids
            .iter()
            .map(|entry| {
                let previous = pending
                    .ids
                    .iter()
                    .find(|p| p.id == entry.id)
                    .map(|p| p.times_delivered as u32)
                    .unwrap_or(1);
                let message = to_message(entry, previous + 1);
                info!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    "Reclaimed message past its visibility timeout"
                );
                message
            })
            .collect();

        Ok(messages)
    }

    /// Read entries never delivered to the group.
    async fn read_new(&self, options: &ReceiveOptions, count: usize) -> QueueResult<Vec<QueueMessage>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut read = redis::cmd("XREADGROUP");
        read.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(count);
        if !options.wait.is_zero() {
            read.arg("BLOCK").arg(options.wait.as_millis() as u64);
        }
        read.arg("STREAMS").arg(&self.config.stream_name).arg(">");

        let reply: Option<StreamReadReply> = read.query_async(&mut conn).await?;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .iter()
                    .flat_map(|key| key.ids.iter())
                    .map(|entry| to_message(entry, 1))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn to_message(entry: &StreamId, receive_count: u32) -> QueueMessage {
    QueueMessage {
        message_id: entry.id.clone(),
        receipt: ReceiptHandle(entry.id.clone()),
        body: entry.get::<String>(FIELD_BODY).unwrap_or_default(),
        attributes: MessageAttributes {
            job_type: entry.get(FIELD_JOB_TYPE),
            video_id: entry.get(FIELD_VIDEO_ID),
        },
        receive_count,
    }
}

#[async_trait]
impl QueueTransport for RedisStreamQueue {
    async fn publish(&self, body: &str, attributes: &MessageAttributes) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut add = redis::cmd("XADD");
        add.arg(&self.config.stream_name).arg("*").arg(FIELD_BODY).arg(body);
        if let Some(job_type) = &attributes.job_type {
            add.arg(FIELD_JOB_TYPE).arg(job_type);
        }
        if let Some(video_id) = attributes.video_id {
            add.arg(FIELD_VIDEO_ID).arg(video_id);
        }

        let message_id: String = add
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        debug!(message_id = %message_id, "Published message");
        Ok(message_id)
    }

    async fn receive(&self, options: &ReceiveOptions) -> QueueResult<Vec<QueueMessage>> {
        let mut messages = self.reclaim_expired(options).await?;
        if !messages.is_empty() {
            return Ok(messages);
        }

        messages.extend(self.read_new(options, options.max_messages).await?);
        Ok(messages)
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(receipt.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(receipt.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", receipt);
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut add = redis::cmd("XADD");
        add.arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(FIELD_BODY)
            .arg(&message.body)
            .arg("reason")
            .arg(reason)
            .arg("original_id")
            .arg(&message.message_id)
            .arg("receive_count")
            .arg(message.receive_count);
        if let Some(job_type) = &message.attributes.job_type {
            add.arg(FIELD_JOB_TYPE).arg(job_type);
        }
        if let Some(video_id) = message.attributes.video_id {
            add.arg(FIELD_VIDEO_ID).arg(video_id);
        }
        add.query_async::<()>(&mut conn).await?;

        self.delete(&message.receipt).await?;

        warn!(
            message_id = %message.message_id,
            receive_count = message.receive_count,
            "Moved message to DLQ: {}",
            reason
        );
        Ok(())
    }
}
