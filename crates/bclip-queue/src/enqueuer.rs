//! Job enqueuer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use bclip_models::{JobId, JobStatus, ProcessVideoJob, UserId, VideoId, JOB_STATUS_TTL};

use crate::error::{QueueError, QueueResult};
use crate::ledger::StatusLedger;
use crate::transport::{MessageAttributes, QueueTransport};

/// Entry point the request layer uses to submit jobs and read their status.
#[derive(Clone)]
pub struct JobEnqueuer {
    transport: Arc<dyn QueueTransport>,
    ledger: Arc<dyn StatusLedger>,
    status_ttl: Duration,
}

impl JobEnqueuer {
    pub fn new(transport: Arc<dyn QueueTransport>, ledger: Arc<dyn StatusLedger>) -> Self {
        Self {
            transport,
            ledger,
            status_ttl: JOB_STATUS_TTL,
        }
    }

    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    /// Create a job for the video and queue it.
    ///
    /// Publishes exactly one message and then seeds the ledger with
    /// `queued`. A failed publish creates nothing. A failed seed after a
    /// successful publish returns [`QueueError::StatusSeedFailed`] carrying
    /// the job id so the caller can retry the seed or fail the video.
    pub async fn enqueue(
        &self,
        video_id: VideoId,
        user_id: UserId,
        title: impl Into<String>,
        input_ref: impl Into<String>,
    ) -> QueueResult<JobId> {
        let job = ProcessVideoJob::new(video_id, user_id, title, input_ref);
        self.enqueue_job(&job).await?;
        Ok(job.job_id)
    }

    /// Queue a prebuilt job.
    pub async fn enqueue_job(&self, job: &ProcessVideoJob) -> QueueResult<String> {
        let body = serde_json::to_string(job)?;
        let attributes = MessageAttributes::for_job(job);

        let message_id = self.transport.publish(&body, &attributes).await.map_err(|e| {
            error!(job_id = %job.job_id, video_id = %job.video_id, "Failed to publish job: {}", e);
            e
        })?;

        match self
            .ledger
            .seed_status(&job.job_id, &JobStatus::Queued, self.status_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                job_id = %job.job_id,
                "Ledger already had a status before enqueue finished; kept it"
            ),
            Err(e) => {
                error!(
                    job_id = %job.job_id,
                    message_id = %message_id,
                    "Job published but queued status was not recorded: {}", e
                );
                return Err(QueueError::StatusSeedFailed {
                    job_id: job.job_id.clone(),
                    source: Box::new(e),
                });
            }
        }

        info!(
            job_id = %job.job_id,
            video_id = %job.video_id,
            message_id = %message_id,
            "Enqueued job"
        );
        Ok(message_id)
    }

    /// Retry seeding `queued` after [`QueueError::StatusSeedFailed`].
    pub async fn reseed_status(&self, job_id: &JobId) -> QueueResult<()> {
        self.ledger
            .seed_status(job_id, &JobStatus::Queued, self.status_ttl)
            .await
            .map(|_| ())
    }

    /// Current status of a job, `None` once it expired or never existed.
    pub async fn status(&self, job_id: &JobId) -> QueueResult<Option<JobStatus>> {
        self.ledger.get_status(job_id).await
    }
}
