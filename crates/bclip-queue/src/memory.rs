//! In-process queue with real visibility windows.
//!
//! Used by tests and local development. Long polls wake on publish and on
//! the earliest visibility expiry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::error::QueueResult;
use crate::transport::{
    MessageAttributes, QueueMessage, QueueTransport, ReceiptHandle, ReceiveOptions,
};

#[derive(Debug)]
struct Entry {
    body: String,
    attributes: MessageAttributes,
    receive_count: u32,
    invisible_until: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
    dead_letters: Vec<(QueueMessage, String)>,
}

/// In-memory [`QueueTransport`].
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages not yet deleted, visible or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a message is still in the queue.
    pub async fn contains(&self, message_id: &str) -> bool {
        match message_id.parse::<u64>() {
            Ok(id) => self.state.lock().await.entries.contains_key(&id),
            Err(_) => false,
        }
    }

    /// Messages moved to the dead-letter list, with their reasons.
    pub async fn dead_letters(&self) -> Vec<(QueueMessage, String)> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Make every in-flight message visible again, as if its window expired.
    pub async fn expire_visibility(&self) {
        let mut state = self.state.lock().await;
        for entry in state.entries.values_mut() {
            entry.invisible_until = None;
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Take visible messages, or report when the next one becomes visible.
    async fn take_visible(&self, options: &ReceiveOptions) -> (Vec<QueueMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut batch = Vec::new();
        let mut next_visible: Option<Instant> = None;

        for (id, entry) in state.entries.iter_mut() {
            match entry.invisible_until {
                Some(until) if until > now => {
                    next_visible = Some(next_visible.map_or(until, |n| n.min(until)));
                }
                _ => {
                    if batch.len() >= options.max_messages {
                        break;
                    }
                    entry.receive_count += 1;
                    entry.invisible_until = Some(now + options.visibility_timeout);
                    batch.push(QueueMessage {
                        message_id: id.to_string(),
                        receipt: ReceiptHandle(id.to_string()),
                        body: entry.body.clone(),
                        attributes: entry.attributes.clone(),
                        receive_count: entry.receive_count,
                    });
                }
            }
        }

        (batch, next_visible)
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn publish(&self, body: &str, attributes: &MessageAttributes) -> QueueResult<String> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(
            id,
            Entry {
                body: body.to_string(),
                attributes: attributes.clone(),
                receive_count: 0,
                invisible_until: None,
            },
        );
        drop(state);

        self.notify.notify_waiters();
        Ok(id.to_string())
    }

    async fn receive(&self, options: &ReceiveOptions) -> QueueResult<Vec<QueueMessage>> {
        let deadline = Instant::now() + options.wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (batch, next_visible) = self.take_visible(options).await;
            if !batch.is_empty() || options.max_messages == 0 {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |t| t.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> QueueResult<()> {
        if let Ok(id) = receipt.as_str().parse::<u64>() {
            self.state.lock().await.entries.remove(&id);
        }
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, reason: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if let Ok(id) = message.receipt.as_str().parse::<u64>() {
            state.entries.remove(&id);
        }
        state
            .dead_letters
            .push((message.clone(), reason.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn options(wait: Duration, visibility: Duration) -> ReceiveOptions {
        ReceiveOptions {
            max_messages: 5,
            wait,
            visibility_timeout: visibility,
        }
    }

    fn attrs() -> MessageAttributes {
        MessageAttributes {
            job_type: Some("video:process".into()),
            video_id: Some(42),
        }
    }

    #[tokio::test]
    async fn test_received_message_is_invisible_until_timeout() {
        let queue = MemoryQueue::new();
        queue.publish("a", &attrs()).await.unwrap();

        let opts = options(Duration::ZERO, Duration::from_secs(60));
        let first = queue.receive(&opts).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count, 1);
        assert_eq!(first[0].attributes, attrs());

        // Still in flight.
        assert!(queue.receive(&opts).await.unwrap().is_empty());

        queue.expire_visibility().await;
        let again = queue.receive(&opts).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].message_id, first[0].message_id);
        assert_eq!(again[0].receive_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivery_after_visibility_window() {
        let queue = MemoryQueue::new();
        queue.publish("a", &attrs()).await.unwrap();

        let opts = options(Duration::from_secs(20), Duration::from_secs(5));
        let first = queue.receive(&opts).await.unwrap();
        assert_eq!(first.len(), 1);

        // Blocks until the 5 s window lapses, well inside the 20 s wait.
        let started = Instant::now();
        let second = queue.receive(&opts).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count, 2);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_delete_removes_for_good() {
        let queue = MemoryQueue::new();
        let id = queue.publish("a", &attrs()).await.unwrap();

        let opts = options(Duration::ZERO, Duration::from_secs(60));
        let msg = queue.receive(&opts).await.unwrap().remove(0);
        queue.delete(&msg.receipt).await.unwrap();

        assert!(!queue.contains(&id).await);
        queue.expire_visibility().await;
        assert!(queue.receive(&opts).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_returns_empty_after_wait() {
        let queue = MemoryQueue::new();
        let started = Instant::now();
        let batch = queue
            .receive(&options(Duration::from_secs(20), Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_publish() {
        let queue = Arc::new(MemoryQueue::new());
        let receiver = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .receive(&options(Duration::from_secs(30), Duration::from_secs(60)))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish("late", &attrs()).await.unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), receiver)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test]
    async fn test_batch_limit_and_dead_letter() {
        let queue = MemoryQueue::new();
        for i in 0..7 {
            queue.publish(&i.to_string(), &attrs()).await.unwrap();
        }

        let opts = options(Duration::ZERO, Duration::from_secs(60));
        let batch = queue.receive(&opts).await.unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0].body, "0");

        queue.dead_letter(&batch[0], "poison").await.unwrap();
        assert_eq!(queue.len().await, 6);
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].1, "poison");
    }
}
