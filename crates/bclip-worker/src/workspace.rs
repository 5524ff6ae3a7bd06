//! Per-job scratch workspace.
//!
//! Each job gets its own directory named after the video and job ids plus a
//! random suffix. The directory is removed when the workspace is dropped,
//! so every exit path of the pipeline (error, deadline, panic) cleans up.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use bclip_models::{JobId, VideoId};

pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Create a fresh directory under `root`.
    pub fn allocate(root: &Path, video_id: VideoId, job_id: &JobId) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("video_{}_{}_", video_id, job_id))
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn original(&self) -> PathBuf {
        self.file("original.mp4")
    }

    pub fn trimmed(&self) -> PathBuf {
        self.file("video_trim.mp4")
    }

    pub fn thumbnail(&self) -> PathBuf {
        self.file("thumb.jpg")
    }

    pub fn scaled_main(&self) -> PathBuf {
        self.file("video_720p.mp4")
    }

    pub fn scaled_intro(&self) -> PathBuf {
        self.file("intro_720.mp4")
    }

    pub fn scaled_outro(&self) -> PathBuf {
        self.file("outro_720.mp4")
    }

    pub fn concat_list(&self) -> PathBuf {
        self.file("concat.txt")
    }

    pub fn concatenated(&self) -> PathBuf {
        self.file("final.mp4")
    }

    pub fn muted(&self) -> PathBuf {
        self.file("final_noaudio.mp4")
    }

    /// Delete the directory now and report failures. Dropping also deletes,
    /// silently.
    pub fn release(self) -> io::Result<()> {
        self.dir.close()
    }
}
