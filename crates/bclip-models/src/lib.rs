//! Shared data models for the bclip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job identity and the queued job payload
//! - Pipeline stages and the job status ledger vocabulary
//! - The video record fields the pipeline reads and writes
//! - Pipeline-wide constants (canvas, trim cap, TTLs)

pub mod constants;
pub mod job;
pub mod job_status;
pub mod stage;
pub mod video;

pub use constants::*;
pub use job::{JobId, ProcessVideoJob, UserId};
pub use job_status::JobStatus;
pub use stage::{Stage, UnknownStage};
pub use video::{VideoId, VideoRecord, VideoStatus};
