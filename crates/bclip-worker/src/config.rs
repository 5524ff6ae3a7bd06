//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use bclip_models::JOB_EXECUTION_TIMEOUT;

/// Where job statuses are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Redis,
    Postgres,
}

/// Where uploads and artifacts are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of dispatch loops running in parallel
    pub pool_size: usize,
    /// Deadline for one job execution
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Parent directory for per-job scratch workspaces
    pub work_dir: PathBuf,
    /// Operator-supplied bracket clips
    pub intro_path: PathBuf,
    pub outro_path: PathBuf,
    /// FFmpeg binary; `None` resolves from PATH
    pub ffmpeg_path: Option<PathBuf>,
    /// Prometheus listener port; `None` disables the exporter
    pub metrics_port: Option<u16>,
    /// Back-off after a failed receive
    pub error_backoff: Duration,
    pub ledger_backend: LedgerBackend,
    pub storage_backend: StorageBackend,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            job_timeout: JOB_EXECUTION_TIMEOUT,
            shutdown_timeout: Duration::from_secs(60),
            work_dir: std::env::temp_dir(),
            intro_path: PathBuf::from("/assets/intro.mp4"),
            outro_path: PathBuf::from("/assets/outro.mp4"),
            ffmpeg_path: None,
            metrics_port: None,
            error_backoff: Duration::from_secs(5),
            ledger_backend: LedgerBackend::Redis,
            storage_backend: StorageBackend::S3,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pool_size: std::env::var("WORKER_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.pool_size),
            job_timeout: std::env::var("WORKER_JOB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            shutdown_timeout: std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            intro_path: std::env::var("BCLIP_INTRO_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.intro_path),
            outro_path: std::env::var("BCLIP_OUTRO_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.outro_path),
            ffmpeg_path: std::env::var("FFMPEG_PATH").ok().map(PathBuf::from),
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
            error_backoff: defaults.error_backoff,
            ledger_backend: match std::env::var("LEDGER_BACKEND").as_deref() {
                Ok("postgres") | Ok("pg") => LedgerBackend::Postgres,
                _ => LedgerBackend::Redis,
            },
            storage_backend: match std::env::var("STORAGE_BACKEND").as_deref() {
                Ok("local") => StorageBackend::Local,
                _ => StorageBackend::S3,
            },
        }
    }

    /// Lease TTL: outlives the job deadline by a minute.
    pub fn lease_ttl(&self) -> Duration {
        self.job_timeout + Duration::from_secs(60)
    }
}
