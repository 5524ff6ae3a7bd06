//! Job status vocabulary for the status ledger.
//!
//! Statuses are stored as plain strings (`queued`, `processing:<stage>`,
//! `failed:<stage>`, `done`) so new stages can be introduced without a
//! storage migration. Strings this build does not recognise parse into
//! [`JobStatus::Other`] and are reported as in progress.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::Stage;

const PROCESSING_PREFIX: &str = "processing:";
const FAILED_PREFIX: &str = "failed:";

/// Job lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Waiting in the queue
    Queued,
    /// A stage is running
    Processing(Stage),
    /// A stage failed and the attempt was aborted
    Failed(Stage),
    /// All stages completed
    Done,
    /// Written by a newer or older build; treated as in progress
    Other(String),
}

impl JobStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, JobStatus::Failed(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, JobStatus::Done)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => f.write_str("queued"),
            JobStatus::Processing(stage) => write!(f, "{}{}", PROCESSING_PREFIX, stage),
            JobStatus::Failed(stage) => write!(f, "{}{}", FAILED_PREFIX, stage),
            JobStatus::Done => f.write_str("done"),
            JobStatus::Other(raw) => f.write_str(raw),
        }
    }
}

impl FromStr for JobStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "queued" => JobStatus::Queued,
            "done" => JobStatus::Done,
            _ => {
                if let Some(stage) = s
                    .strip_prefix(PROCESSING_PREFIX)
                    .and_then(|tag| tag.parse().ok())
                {
                    JobStatus::Processing(stage)
                } else if let Some(stage) =
                    s.strip_prefix(FAILED_PREFIX).and_then(|tag| tag.parse().ok())
                {
                    JobStatus::Failed(stage)
                } else {
                    JobStatus::Other(s.to_string())
                }
            }
        };
        Ok(status)
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(JobStatus::from(raw.as_str()))
    }
}
