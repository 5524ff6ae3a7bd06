//! Structured job logging utilities.
//!
//! Every line carries the job and video ids so one job can be followed
//! across dispatch, stages and publishing.

use tracing::{error, info, warn, Span};

use bclip_models::{ProcessVideoJob, Stage};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    video_id: i64,
}

impl JobLogger {
    pub fn new(job: &ProcessVideoJob) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            video_id: job.video_id.get(),
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, receive_count: u32) {
        info!(
            job_id = %self.job_id,
            video_id = self.video_id,
            receive_count,
            "Job started"
        );
    }

    /// Log entry into a stage.
    pub fn log_stage(&self, stage: Stage) {
        info!(
            job_id = %self.job_id,
            video_id = self.video_id,
            stage = %stage,
            "Job progress: {}", stage
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            video_id = self.video_id,
            "Job warning: {}", message
        );
    }

    /// Log a stage failure.
    pub fn log_stage_error(&self, stage: Stage, message: &str) {
        error!(
            job_id = %self.job_id,
            video_id = self.video_id,
            stage = %stage,
            "Job failed at {}: {}", stage, message
        );
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            video_id = self.video_id,
            elapsed_secs,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn video_id(&self) -> i64 {
        self.video_id
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, video_id = self.video_id)
    }
}
