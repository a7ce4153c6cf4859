//! Replay capture
//!
//! Turning a replay into raw video and audio streams is delegated to an external
//! emulator behind the [`Capture`] trait. Each call gets its own working directory and
//! must not share state with concurrent calls.

pub mod dolphin;

pub use dolphin::{build_dolphin_command, DolphinCapture};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for capture operations
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Emulator process exited with non-zero status
    #[error("Emulator failed with exit code: {0}")]
    Failed(i32),

    /// Emulator process was terminated by signal
    #[error("Emulator process was terminated by signal")]
    Terminated,

    /// Emulator exited before the target frame was reached
    #[error("Emulator stopped at frame {reached} of {target}")]
    Incomplete { reached: u64, target: u64 },

    /// Expected dump file is missing after the run
    #[error("Capture output missing: {0}")]
    MissingOutput(PathBuf),

    /// IO error while preparing or running the capture
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write the playback instructions
    #[error("Failed to write playback file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw streams produced by one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStreams {
    pub video: PathBuf,
    pub audio: PathBuf,
}

/// Frame capture collaborator
pub trait Capture: Send + Sync {
    /// Play `replay` for `frames` frames, writing only inside `workdir`
    fn capture(
        &self,
        replay: &Path,
        frames: u64,
        workdir: &Path,
    ) -> Result<CapturedStreams, CaptureError>;
}
