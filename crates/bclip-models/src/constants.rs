//! Pipeline-wide constants.

use std::time::Duration;

/// Routing attribute value for video processing messages.
pub const JOB_TYPE_PROCESS_VIDEO: &str = "video:process";

/// TTL applied to every job status write.
pub const JOB_STATUS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval between ledger cleanup runs.
pub const LEDGER_CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Upper bound for a single ledger cleanup run.
pub const LEDGER_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single job execution.
pub const JOB_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Maximum duration of the user clip, in seconds. Shared by all jobs.
pub const MAX_CLIP_SECONDS: u32 = 30;

/// Output canvas width.
pub const CANVAS_WIDTH: u32 = 1280;

/// Output canvas height.
pub const CANVAS_HEIGHT: u32 = 720;

/// Timestamp of the thumbnail frame in the original source.
pub const THUMBNAIL_TIMESTAMP: &str = "00:00:00";
