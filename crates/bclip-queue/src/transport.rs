//! Queue transport interface.
//!
//! Delivery is at-least-once. A received message stays invisible to other
//! receivers for the visibility timeout and reappears if it is not deleted
//! before then. [`QueueTransport::delete`] is the only acknowledgement.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bclip_models::{ProcessVideoJob, JOB_TYPE_PROCESS_VIDEO};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// Routing attributes stored next to the body.
///
/// Consumers filter on these without deserializing the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttributes {
    pub job_type: Option<String>,
    pub video_id: Option<i64>,
}

impl MessageAttributes {
    /// Attributes for a process-video job.
    pub fn for_job(job: &ProcessVideoJob) -> Self {
        Self {
            job_type: Some(JOB_TYPE_PROCESS_VIDEO.to_string()),
            video_id: Some(job.video_id.get()),
        }
    }

    pub fn is_job_type(&self, job_type: &str) -> bool {
        self.job_type.as_deref() == Some(job_type)
    }
}

/// Opaque handle used to acknowledge one delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A delivered message.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt: ReceiptHandle,
    pub body: String,
    pub attributes: MessageAttributes,
    /// Number of times this message has been delivered, including this one
    pub receive_count: u32,
}

impl QueueMessage {
    /// Deserialize the body as a process-video job.
    pub fn parse_job(&self) -> QueueResult<ProcessVideoJob> {
        serde_json::from_str(&self.body)
            .map_err(|e| QueueError::invalid_message(&self.message_id, e.to_string()))
    }
}

/// Parameters for one receive call.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveOptions {
    pub max_messages: usize,
    /// Long-poll budget when nothing is available
    pub wait: Duration,
    pub visibility_timeout: Duration,
}

impl ReceiveOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_messages: config.receive_batch,
            wait: config.wait_time,
            visibility_timeout: config.visibility_timeout,
        }
    }
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// At-least-once message queue.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Publish a message and return its id.
    async fn publish(&self, body: &str, attributes: &MessageAttributes) -> QueueResult<String>;

    /// Receive up to `max_messages`, blocking up to `wait` when empty.
    async fn receive(&self, options: &ReceiveOptions) -> QueueResult<Vec<QueueMessage>>;

    /// Acknowledge a delivery; the message is removed for good.
    async fn delete(&self, receipt: &ReceiptHandle) -> QueueResult<()>;

    /// Move a message to the dead-letter stream and remove it from the queue.
    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> QueueResult<()>;
}
