//! Per-job advisory lease.
//!
//! Redelivery can hand the same job to two workers while the first is still
//! running it. A worker takes the lease before executing and releases it
//! when done; the TTL bounds how long a crashed holder blocks the job.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use bclip_models::JobId;

use crate::error::QueueResult;

#[async_trait]
pub trait JobLease: Send + Sync {
    /// Take the lease for `job_id`. Returns `false` if another holder has it.
    async fn try_acquire(&self, job_id: &JobId, holder: &str, ttl: Duration) -> QueueResult<bool>;

    /// Release the lease if `holder` still owns it.
    async fn release(&self, job_id: &JobId, holder: &str) -> QueueResult<()>;
}

mod scripts {
    use redis::Script;

    /// Delete the key only if it still holds our token.
    pub fn release() -> Script {
        Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
            "#,
        )
    }
}

/// Lease stored as `SET key holder NX PX ttl`.
pub struct RedisJobLease {
    client: redis::Client,
    key_prefix: String,
    release_script: Script,
}

impl RedisJobLease {
    pub fn new(redis_url: &str, key_prefix: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: format!("{}:lease", key_prefix),
            release_script: scripts::release(),
        })
    }

    pub fn from_config(config: &crate::QueueConfig) -> QueueResult<Self> {
        Self::new(&config.redis_url, &config.ledger_key_prefix)
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.key_prefix, job_id)
    }
}

#[async_trait]
impl JobLease for RedisJobLease {
    async fn try_acquire(&self, job_id: &JobId, holder: &str, ttl: Duration) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(job_id))
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        let acquired = reply.is_some();
        debug!(job_id = %job_id, holder, acquired, "Lease acquire");
        Ok(acquired)
    }

    async fn release(&self, job_id: &JobId, holder: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: i64 = self
            .release_script
            .key(self.key(job_id))
            .arg(holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// In-memory lease for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryJobLease {
    held: Mutex<HashMap<JobId, (String, Instant)>>,
}

impl MemoryJobLease {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn holder(&self, job_id: &JobId) -> Option<String> {
        let held = self.held.lock().await;
        held.get(job_id)
            .filter(|(_, until)| *until > Instant::now())
            .map(|(holder, _)| holder.clone())
    }
}

#[async_trait]
impl JobLease for MemoryJobLease {
    async fn try_acquire(&self, job_id: &JobId, holder: &str, ttl: Duration) -> QueueResult<bool> {
        let now = Instant::now();
        let mut held = self.held.lock().await;
        match held.get(job_id) {
            Some((_, until)) if *until > now => Ok(false),
            _ => {
                held.insert(job_id.clone(), (holder.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release(&self, job_id: &JobId, holder: &str) -> QueueResult<()> {
        let mut held = self.held.lock().await;
        if held.get(job_id).is_some_and(|(owner, _)| owner == holder) {
            held.remove(job_id);
        }
        Ok(())
    }
}
