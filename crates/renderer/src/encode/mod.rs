//! Encoding modules
//!
//! Clip encoding and clip concatenation are delegated to an external encoder behind the
//! [`Encoder`] trait.

pub mod ffmpeg;

pub use ffmpeg::{build_concat_command, build_encode_command, FfmpegEncoder};

use crate::capture::CapturedStreams;
use std::path::Path;
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder process exited with non-zero status
    #[error("Encoder failed with exit code: {0}")]
    Failed(i32),

    /// Encoder process was terminated by signal
    #[error("Encoder process was terminated by signal")]
    Terminated,

    /// IO error during encoding
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode and concatenate collaborator
pub trait Encoder: Send + Sync {
    /// Mux captured streams into one finished clip at `output`
    fn encode(&self, streams: &CapturedStreams, output: &Path) -> Result<(), EncodeError>;

    /// Join the clips listed in `manifest`, in listed order, into `output`
    fn concat(&self, manifest: &Path, output: &Path) -> Result<(), EncodeError>;
}
