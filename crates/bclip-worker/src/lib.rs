//! Video processing worker.
//!
//! Pulls `video:process` messages from the queue, runs the transform
//! pipeline for each job and publishes the results.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod tracker;
pub mod workspace;

pub use config::{LedgerBackend, StorageBackend, WorkerConfig};
pub use dispatcher::{Disposition, Dispatcher, DispatcherConfig, IgnoreReason, JobHandler};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::TransformPipeline;
pub use publisher::{PublishedRefs, ResultPublisher};
pub use tracker::StageTracker;
pub use workspace::ScratchWorkspace;
