//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use bclip_models::Stage;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "bclip_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "bclip_jobs_failed_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "bclip_jobs_dead_lettered_total";
    pub const MESSAGES_IGNORED_TOTAL: &str = "bclip_messages_ignored_total";
    pub const STAGE_DURATION_SECONDS: &str = "bclip_stage_duration_seconds";
    pub const JOB_DURATION_SECONDS: &str = "bclip_job_duration_seconds";
    pub const LEDGER_CLEANUP_REMOVED_TOTAL: &str = bclip_queue::janitor::CLEANUP_REMOVED_METRIC;
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a job that finished every stage.
pub fn record_job_completed(duration: Duration) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Record a failed job. `stage` is the failing stage tag or `timeout`.
pub fn record_job_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_dead_lettered() {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL).increment(1);
}

/// Record a message skipped without acknowledgement.
pub fn record_message_ignored(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::MESSAGES_IGNORED_TOTAL, &labels).increment(1);
}

pub fn record_stage_duration(stage: Stage, duration: Duration) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}
