//! FFmpeg CLI orchestration for the bclip transform stages.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - The `StageRunner` capability, so the pipeline never spawns processes directly
//! - A subprocess runner with timeout and kill-on-cancel
//! - Argument builders for every transform stage (trim, thumbnail, scale, concat, mute)

pub mod command;
pub mod error;
pub mod operations;
pub mod runner;

pub use command::{check_ffmpeg, FfmpegCommand};
pub use error::{MediaError, MediaResult};
pub use operations::{
    canvas_filter, concat_command, mute_command, scale_to_canvas_command, thumbnail_command,
    trim_command, write_concat_list,
};
pub use runner::{run_checked, FfmpegRunner, StageRunner, ToolOutput};
