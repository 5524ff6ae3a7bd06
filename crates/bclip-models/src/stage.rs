//! Pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A step of the transform pipeline.
///
/// The string form is the tag written to the ledger as
/// `processing:<tag>` or `failed:<tag>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Scratch workspace allocation
    CreateWorkdir,
    /// Copy the source blob into the workspace
    DownloadOriginal,
    /// Cap the clip duration
    Trim,
    /// Extract the first frame of the original
    Thumb,
    /// Scale the trimmed clip onto the canvas
    ScaleMain,
    /// Scale the intro bracket clip
    ScaleIntro,
    /// Scale the outro bracket clip
    ScaleOutro,
    /// Join intro, main and outro
    Concat,
    /// Drop the audio track
    Mute,
    /// Mark the video record as processing
    UpdateStatusProcessing,
    /// Upload the final clip
    UploadProcessed,
    /// Upload the thumbnail
    UploadThumb,
    /// Record the processed clip URL
    UpdateProcessedUrl,
    /// Record the thumbnail URL
    UpdateThumbUrl,
    /// Mark the video record as processed
    UpdateStatusProcessed,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 15] = [
        Stage::CreateWorkdir,
        Stage::DownloadOriginal,
        Stage::Trim,
        Stage::Thumb,
        Stage::ScaleMain,
        Stage::ScaleIntro,
        Stage::ScaleOutro,
        Stage::Concat,
        Stage::Mute,
        Stage::UpdateStatusProcessing,
        Stage::UploadProcessed,
        Stage::UploadThumb,
        Stage::UpdateProcessedUrl,
        Stage::UpdateThumbUrl,
        Stage::UpdateStatusProcessed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CreateWorkdir => "create_workdir",
            Stage::DownloadOriginal => "download_original",
            Stage::Trim => "trim",
            Stage::Thumb => "thumb",
            Stage::ScaleMain => "scale_main",
            Stage::ScaleIntro => "scale_intro",
            Stage::ScaleOutro => "scale_outro",
            Stage::Concat => "concat",
            Stage::Mute => "mute",
            Stage::UpdateStatusProcessing => "update_status_processing",
            Stage::UploadProcessed => "upload_processed",
            Stage::UploadThumb => "upload_thumb",
            Stage::UpdateProcessedUrl => "update_processed_url",
            Stage::UpdateThumbUrl => "update_thumb_url",
            Stage::UpdateStatusProcessed => "update_status_processed",
        }
    }

    /// Whether this stage belongs to the commit phase, after which the
    /// video record may already show `processing`.
    pub fn is_publish_phase(&self) -> bool {
        matches!(
            self,
            Stage::UpdateStatusProcessing
                | Stage::UploadProcessed
                | Stage::UploadThumb
                | Stage::UpdateProcessedUrl
                | Stage::UpdateThumbUrl
                | Stage::UpdateStatusProcessed
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a tag does not name a known stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage tag: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}
