//! Job status ledger.
//!
//! One entry per job id, last write wins. Every write sets a fresh absolute
//! expiry, and reads treat an expired entry as missing whether or not
//! cleanup has removed it yet.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Script;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use bclip_models::{JobId, JobStatus};

use crate::error::{QueueError, QueueResult};

/// Stored ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(status: JobStatus, ttl: Duration) -> QueueResult<Self> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| QueueError::ledger(format!("invalid ttl: {}", e)))?;
        Ok(Self {
            status,
            updated_at: now,
            expires_at: now + ttl,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Durable job id -> status map with expiry.
#[async_trait]
pub trait StatusLedger: Send + Sync {
    /// Upsert the status with expiry `now + ttl`.
    async fn set_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<()>;

    /// Insert the status only if the job has no live entry yet.
    ///
    /// Returns `false` when an entry already existed. The enqueuer seeds
    /// `queued` this way so it never overwrites progress a fast worker
    /// already reported.
    async fn seed_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<bool>;

    /// Current status, or `None` if missing or expired.
    async fn get_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatus>>;

    /// Delete every expired entry and return how many were removed.
    async fn cleanup(&self) -> QueueResult<u64>;
}

/// In-memory ledger for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStatusLedger {
    entries: RwLock<HashMap<JobId, LedgerEntry>>,
}

impl MemoryStatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw entry, expired or not.
    pub async fn entry(&self, job_id: &JobId) -> Option<LedgerEntry> {
        self.entries.read().await.get(job_id).cloned()
    }

    /// Store an entry as-is, e.g. one that has already expired.
    pub async fn insert_entry(&self, job_id: JobId, entry: LedgerEntry) {
        self.entries.write().await.insert(job_id, entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StatusLedger for MemoryStatusLedger {
    async fn set_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<()> {
        let entry = LedgerEntry::new(status.clone(), ttl)?;
        self.entries.write().await.insert(job_id.clone(), entry);
        Ok(())
    }

    async fn seed_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<bool> {
        let entry = LedgerEntry::new(status.clone(), ttl)?;
        let mut entries = self.entries.write().await;
        match entries.get(job_id) {
            Some(existing) if !existing.is_expired_at(Utc::now()) => Ok(false),
            _ => {
                entries.insert(job_id.clone(), entry);
                Ok(true)
            }
        }
    }

    async fn get_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatus>> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .await
            .get(job_id)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.status.clone()))
    }

    async fn cleanup(&self) -> QueueResult<u64> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        Ok((before - entries.len()) as u64)
    }
}

mod scripts {
    use redis::Script;

    /// Insert into the hash and expiry index unless a live entry exists.
    pub fn seed() -> Script {
        Script::new(
            r#"
            local current = redis.call('ZSCORE', KEYS[2], ARGV[1])
            if current and tonumber(current) > tonumber(ARGV[3]) then
                return 0
            end
            redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
            redis.call('ZADD', KEYS[2], ARGV[4], ARGV[1])
            return 1
            "#,
        )
    }

    /// Remove every member whose expiry score is at or before `now`.
    pub fn cleanup() -> Script {
        Script::new(
            r#"
            local ids = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
            for _, id in ipairs(ids) do
                redis.call('HDEL', KEYS[1], id)
                redis.call('ZREM', KEYS[2], id)
            end
            return #ids
            "#,
        )
    }
}

/// Ledger on a Redis hash plus a sorted set indexed by expiry.
pub struct RedisStatusLedger {
    client: redis::Client,
    hash_key: String,
    expiry_key: String,
    seed_script: Script,
    cleanup_script: Script,
}

impl RedisStatusLedger {
    pub fn new(redis_url: &str, key_prefix: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            hash_key: format!("{}:status", key_prefix),
            expiry_key: format!("{}:expiry", key_prefix),
            seed_script: scripts::seed(),
            cleanup_script: scripts::cleanup(),
        })
    }

    pub fn from_config(config: &crate::QueueConfig) -> QueueResult<Self> {
        Self::new(&config.redis_url, &config.ledger_key_prefix)
    }
}

#[async_trait]
impl StatusLedger for RedisStatusLedger {
    async fn set_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<()> {
        let entry = LedgerEntry::new(status.clone(), ttl)?;
        let payload = serde_json::to_string(&entry)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::pipe()
            .atomic()
            .hset(&self.hash_key, job_id.as_str(), payload)
            .ignore()
            .zadd(&self.expiry_key, job_id.as_str(), entry.expires_at.timestamp_millis())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %job_id, status = %status, "Ledger status set");
        Ok(())
    }

    async fn seed_status(&self, job_id: &JobId, status: &JobStatus, ttl: Duration) -> QueueResult<bool> {
        let entry = LedgerEntry::new(status.clone(), ttl)?;
        let payload = serde_json::to_string(&entry)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let inserted: i64 = self
            .seed_script
            .key(&self.hash_key)
            .key(&self.expiry_key)
            .arg(job_id.as_str())
            .arg(payload)
            .arg(entry.updated_at.timestamp_millis())
            .arg(entry.expires_at.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        Ok(inserted == 1)
    }

    async fn get_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatus>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = redis::cmd("HGET")
            .arg(&self.hash_key)
            .arg(job_id.as_str())
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry: LedgerEntry = serde_json::from_str(&raw)?;
        if entry.is_expired_at(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(entry.status))
    }

    async fn cleanup(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: u64 = self
            .cleanup_script
            .key(&self.hash_key)
            .key(&self.expiry_key)
            .arg(Utc::now().timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(removed)
    }
}
