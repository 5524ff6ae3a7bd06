//! Ledger reporting for pipeline stages.
//!
//! Ledger writes are best-effort: a failed write is logged and the stage
//! carries on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use bclip_models::{JobId, JobStatus, ProcessVideoJob, Stage, JOB_STATUS_TTL};
use bclip_queue::StatusLedger;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// A running stage, returned by [`StageTracker::begin`].
#[must_use]
pub struct StageTimer {
    stage: Stage,
    started: Instant,
}

impl StageTimer {
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

/// Reports one job's stage transitions to the ledger.
pub struct StageTracker {
    ledger: Arc<dyn StatusLedger>,
    job_id: JobId,
    status_ttl: Duration,
    logger: JobLogger,
}

impl StageTracker {
    pub fn new(ledger: Arc<dyn StatusLedger>, job: &ProcessVideoJob) -> Self {
        Self {
            ledger,
            job_id: job.job_id.clone(),
            status_ttl: JOB_STATUS_TTL,
            logger: JobLogger::new(job),
        }
    }

    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    /// Mark `stage` as in progress.
    pub async fn begin(&self, stage: Stage) -> StageTimer {
        self.logger.log_stage(stage);
        self.write(JobStatus::Processing(stage)).await;
        StageTimer {
            stage,
            started: Instant::now(),
        }
    }

    /// Close a stage. On error the ledger gets `failed:<stage>` and the
    /// error is wrapped with the stage.
    pub async fn finish<T, E>(&self, timer: StageTimer, result: Result<T, E>) -> WorkerResult<T>
    where
        E: Into<WorkerError>,
    {
        metrics::record_stage_duration(timer.stage, timer.started.elapsed());
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let e = e.into();
                self.logger.log_stage_error(timer.stage, &e.to_string());
                self.write(JobStatus::Failed(timer.stage)).await;
                Err(WorkerError::stage(timer.stage, e))
            }
        }
    }

    /// Mark the job done.
    pub async fn done(&self) {
        self.write(JobStatus::Done).await;
    }

    async fn write(&self, status: JobStatus) {
        if let Err(e) = self
            .ledger
            .set_status(&self.job_id, &status, self.status_ttl)
            .await
        {
            warn!(
                job_id = %self.job_id,
                status = %status,
                "Failed to write job status: {}", e
            );
        }
    }
}
