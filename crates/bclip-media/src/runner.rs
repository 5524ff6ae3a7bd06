//! Subprocess runner for FFmpeg commands.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 4096;

/// Outcome of one media tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Tail of the captured stderr
    pub stderr: String,
}

impl ToolOutput {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability to execute one transform stage with the external media tool.
///
/// `Err` means the tool could not be run at all (spawn failure, timeout);
/// a tool that ran and exited non-zero is reported through
/// [`ToolOutput::exit_code`].
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput>;
}

/// Run a command and turn a non-zero exit into an error.
pub async fn run_checked(runner: &dyn StageRunner, cmd: &FfmpegCommand) -> MediaResult<()> {
    let output = runner.run(cmd).await?;
    if output.is_success() {
        Ok(())
    } else {
        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(output.stderr),
            output.exit_code,
        ))
    }
}

/// Runs FFmpeg as a child process.
///
/// The child is spawned with `kill_on_drop`, so dropping the future
/// (job deadline, shutdown) kills the process instead of leaking it.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: PathBuf,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner that resolves `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }

    /// Use an explicit binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

#[async_trait]
impl StageRunner for FfmpegRunner {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.program.display(), args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::FfmpegNotFound
                } else {
                    MediaError::Spawn {
                        program: self.program.display().to_string(),
                        source: e,
                    }
                }
            })?;

        // The job deadline cancels this future; kill_on_drop reaps the child.
        let output = child.wait_with_output().await?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

fn stderr_tail(raw: &[u8]) -> String {
    let start = raw.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&raw[start..]).trim().to_string()
}
