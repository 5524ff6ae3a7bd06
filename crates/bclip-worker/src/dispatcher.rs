//! Worker dispatch loop.
//!
//! Each pool loop owns one receive/execute/acknowledge cycle at a time.
//! A message is deleted only after its job succeeded (or was already done);
//! every other outcome leaves it to redeliver after the visibility window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use bclip_models::{JobStatus, ProcessVideoJob, Stage, JOB_TYPE_PROCESS_VIDEO};
use bclip_queue::{JobLease, QueueConfig, QueueMessage, QueueTransport, ReceiveOptions, StatusLedger};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Executes one job. Implemented by the transform pipeline.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ProcessVideoJob) -> WorkerResult<()>;

    /// Called after `handle` was cancelled at the job deadline, with the
    /// stage the ledger last showed in progress.
    async fn on_timeout(&self, _job: &ProcessVideoJob, _stage: Option<Stage>) {}
}

/// Why a message was left in the queue untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnknownJobType,
    Malformed,
    LeaseHeld,
    LeaseUnavailable,
    DeadLetterFailed,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownJobType => "unknown_job_type",
            Self::Malformed => "malformed",
            Self::LeaseHeld => "lease_held",
            Self::LeaseUnavailable => "lease_unavailable",
            Self::DeadLetterFailed => "dead_letter_failed",
        }
    }
}

/// Outcome of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Job succeeded and the message was deleted.
    Completed,
    /// Job failed, at `stage` when known. Not deleted.
    Failed { stage: Option<Stage> },
    /// Job hit its deadline and was cancelled. Not deleted.
    TimedOut,
    /// Message skipped without acknowledgement.
    Ignored(IgnoreReason),
    /// Receive count exceeded the limit; moved to the dead-letter stream.
    DeadLettered,
    /// Ledger already says `done`; the stale message was deleted.
    AlreadyDone,
}

impl Disposition {
    /// Whether the message was removed from the queue.
    pub fn acknowledged(&self) -> bool {
        matches!(self, Self::Completed | Self::DeadLettered | Self::AlreadyDone)
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub receive: ReceiveOptions,
    /// Deadline for one job execution
    pub job_timeout: Duration,
    /// Receives allowed before dead-lettering; 0 = unlimited
    pub max_receives: u32,
    pub lease_ttl: Duration,
    /// Number of parallel dispatch loops
    pub pool_size: usize,
    /// Back-off after a failed receive
    pub error_backoff: Duration,
}

impl DispatcherConfig {
    pub fn new(worker: &WorkerConfig, queue: &QueueConfig) -> Self {
        Self {
            receive: ReceiveOptions::from_config(queue),
            job_timeout: worker.job_timeout,
            max_receives: queue.max_receives,
            lease_ttl: worker.lease_ttl(),
            pool_size: worker.pool_size.max(1),
            error_backoff: worker.error_backoff,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new(&WorkerConfig::default(), &QueueConfig::default())
    }
}

/// Pulls messages and hands recognized jobs to a [`JobHandler`].
pub struct Dispatcher {
    transport: Arc<dyn QueueTransport>,
    handler: Arc<dyn JobHandler>,
    lease: Arc<dyn JobLease>,
    ledger: Arc<dyn StatusLedger>,
    config: DispatcherConfig,
    worker_name: String,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        handler: Arc<dyn JobHandler>,
        lease: Arc<dyn JobLease>,
        ledger: Arc<dyn StatusLedger>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            transport,
            handler,
            lease,
            ledger,
            config,
            worker_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Name used as lease holder.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Run `pool_size` dispatch loops until `shutdown` flips to `true`.
    ///
    /// Shutdown only stops future receives. Jobs already executing run to
    /// completion before this returns.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(
            worker = %self.worker_name,
            pool_size = self.config.pool_size,
            "Starting dispatcher"
        );

        let mut loops = JoinSet::new();
        for slot in 0..self.config.pool_size {
            let dispatcher = Arc::clone(&self);
            let shutdown = shutdown.clone();
            loops.spawn(async move { dispatcher.run_loop(slot, shutdown).await });
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                error!("Dispatch loop exited abnormally: {}", e);
            }
        }

        info!(worker = %self.worker_name, "Dispatcher stopped");
    }

    async fn run_loop(&self, slot: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(slot, "Dispatch loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.transport.receive(&self.config.receive) => result,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    error!(slot, "Error receiving messages: {}", e);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => continue,
                    }
                }
            };

            for message in messages {
                // Unstarted messages redeliver after the visibility window.
                if *shutdown.borrow() {
                    break;
                }
                self.handle_message(message).await;
            }
        }
        debug!(slot, "Dispatch loop stopped");
    }

    /// One receive followed by handling every received message in order.
    pub async fn poll_once(&self) -> WorkerResult<Vec<Disposition>> {
        let messages = self.transport.receive(&self.config.receive).await?;
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.handle_message(message).await);
        }
        Ok(outcomes)
    }

    /// Filter, parse, execute and acknowledge one message.
    pub async fn handle_message(&self, message: QueueMessage) -> Disposition {
        if !message.attributes.is_job_type(JOB_TYPE_PROCESS_VIDEO) {
            debug!(
                message_id = %message.message_id,
                job_type = ?message.attributes.job_type,
                "Skipping message with unrecognized job type"
            );
            return self.ignore(IgnoreReason::UnknownJobType);
        }

        if self.config.max_receives > 0 && message.receive_count > self.config.max_receives {
            return self.dead_letter(&message).await;
        }

        let job = match message.parse_job() {
            Ok(job) => job,
            Err(e) => {
                warn!(message_id = %message.message_id, "Skipping malformed message: {}", e);
                return self.ignore(IgnoreReason::Malformed);
            }
        };

        if self.already_done(&job).await {
            info!(
                job_id = %job.job_id,
                message_id = %message.message_id,
                "Job already done, deleting stale message"
            );
            self.acknowledge(&message, &job).await;
            return Disposition::AlreadyDone;
        }

        match self
            .lease
            .try_acquire(&job.job_id, &self.worker_name, self.config.lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(job_id = %job.job_id, "Job is running on another worker, skipping");
                return self.ignore(IgnoreReason::LeaseHeld);
            }
            Err(e) => {
                warn!(job_id = %job.job_id, "Could not take job lease: {}", e);
                return self.ignore(IgnoreReason::LeaseUnavailable);
            }
        }

        let disposition = self.execute(&message, job.clone()).await;

        if disposition == Disposition::Completed {
            self.acknowledge(&message, &job).await;
        }

        if let Err(e) = self.lease.release(&job.job_id, &self.worker_name).await {
            warn!(job_id = %job.job_id, "Failed to release job lease: {}", e);
        }

        disposition
    }

    /// Run the handler on its own task under the job deadline.
    async fn execute(&self, message: &QueueMessage, job: ProcessVideoJob) -> Disposition {
        let logger = JobLogger::new(&job);
        logger.log_start(message.receive_count);
        let started = Instant::now();

        let handler = Arc::clone(&self.handler);
        let job_for_task = job.clone();
        let task = tokio::spawn(async move { handler.handle(&job_for_task).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(self.config.job_timeout, task).await {
            Ok(Ok(Ok(()))) => {
                metrics::record_job_completed(started.elapsed());
                Disposition::Completed
            }
            Ok(Ok(Err(e))) => {
                let stage = e.failed_stage();
                error!(
                    job_id = %job.job_id,
                    video_id = %job.video_id,
                    stage = stage.map(|s| s.as_str()).unwrap_or("unknown"),
                    "Job failed: {}", e
                );
                metrics::record_job_failed(stage.map(|s| s.as_str()).unwrap_or("unknown"));
                Disposition::Failed { stage }
            }
            Ok(Err(join_error)) => {
                error!(job_id = %job.job_id, "Job task panicked: {}", join_error);
                metrics::record_job_failed("panic");
                Disposition::Failed { stage: None }
            }
            Err(_) => {
                // Dropping the task kills the running tool and removes the workspace.
                abort.abort();
                let err = WorkerError::Timeout(self.config.job_timeout);
                error!(job_id = %job.job_id, video_id = %job.video_id, "{}", err);
                let stage = self.mark_timed_out(&job).await;
                self.handler.on_timeout(&job, stage).await;
                metrics::record_job_failed("timeout");
                Disposition::TimedOut
            }
        }
    }

    /// Turn the last `processing:<stage>` into `failed:<stage>`.
    async fn mark_timed_out(&self, job: &ProcessVideoJob) -> Option<Stage> {
        let stage = match self.ledger.get_status(&job.job_id).await {
            Ok(Some(JobStatus::Processing(stage))) => stage,
            Ok(_) => return None,
            Err(e) => {
                warn!(job_id = %job.job_id, "Failed to read job status: {}", e);
                return None;
            }
        };
        if let Err(e) = self
            .ledger
            .set_status(&job.job_id, &JobStatus::Failed(stage), bclip_models::JOB_STATUS_TTL)
            .await
        {
            warn!(job_id = %job.job_id, "Failed to write job status: {}", e);
        }
        Some(stage)
    }

    async fn already_done(&self, job: &ProcessVideoJob) -> bool {
        match self.ledger.get_status(&job.job_id).await {
            Ok(status) => status.is_some_and(|s| s.is_done()),
            Err(e) => {
                debug!(job_id = %job.job_id, "Status lookup failed, running job: {}", e);
                false
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage, job: &ProcessVideoJob) {
        if let Err(e) = self.transport.delete(&message.receipt).await {
            error!(
                job_id = %job.job_id,
                message_id = %message.message_id,
                "Failed to delete message: {}", e
            );
        }
    }

    async fn dead_letter(&self, message: &QueueMessage) -> Disposition {
        let reason = format!(
            "received {} times, limit {}",
            message.receive_count, self.config.max_receives
        );
        match self.transport.dead_letter(message, &reason).await {
            Ok(()) => {
                warn!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    "Moved message to dead-letter stream"
                );
                metrics::record_dead_lettered();
                Disposition::DeadLettered
            }
            Err(e) => {
                error!(message_id = %message.message_id, "Failed to dead-letter message: {}", e);
                self.ignore(IgnoreReason::DeadLetterFailed)
            }
        }
    }

    fn ignore(&self, reason: IgnoreReason) -> Disposition {
        metrics::record_message_ignored(reason.as_str());
        Disposition::Ignored(reason)
    }
}
