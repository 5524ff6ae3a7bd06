//! Relational store access for the bclip pipeline.
//!
//! - `VideoRepository`: the video row fields the pipeline writes
//! - `PgStatusLedger`: the job status ledger on a `job_status` table

pub mod config;
pub mod error;
pub mod handle;
pub mod ledger;
pub mod video;

pub use config::DbConfig;
pub use error::{DbError, DbResult};
pub use handle::DbHandle;
pub use ledger::PgStatusLedger;
pub use video::{MemoryVideoRepository, PgVideoRepository, VideoRepository};
