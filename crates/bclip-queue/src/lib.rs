//! Job queue plumbing for the bclip pipeline.
//!
//! This crate provides:
//! - A `QueueTransport` abstraction with Redis Streams and in-memory backends
//! - The job status ledger with expiry-aware reads and a cleanup loop
//! - Per-job leases so one job never runs on two workers at once
//! - `JobEnqueuer`, the entry point the request layer calls

pub mod config;
pub mod enqueuer;
pub mod error;
pub mod janitor;
pub mod ledger;
pub mod lease;
pub mod memory;
pub mod redis_stream;
pub mod transport;

pub use config::QueueConfig;
pub use enqueuer::JobEnqueuer;
pub use error::{QueueError, QueueResult};
pub use janitor::LedgerJanitor;
pub use ledger::{LedgerEntry, MemoryStatusLedger, RedisStatusLedger, StatusLedger};
pub use lease::{JobLease, MemoryJobLease, RedisJobLease};
pub use memory::MemoryQueue;
pub use redis_stream::RedisStreamQueue;
pub use transport::{MessageAttributes, QueueMessage, QueueTransport, ReceiptHandle, ReceiveOptions};
