//! FFmpeg encoder module
//!
//! Builds and runs the encoder invocations for clip encoding and concatenation.

use super::{EncodeError, Encoder};
use crate::capture::CapturedStreams;
use crate::config::Config;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Encoder backed by the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    bitrate_kbps: u32,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: PathBuf, bitrate_kbps: u32) -> Self {
        Self {
            ffmpeg,
            bitrate_kbps,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths.ffmpeg.clone(), config.video.bitrate_kbps)
    }
}

/// Build the command that muxes a video and an audio dump into an mp4 clip
///
/// Creates a Command configured with:
/// - Overwrite without prompting
/// - Video and audio dumps as the two inputs
/// - Target video bitrate from configuration
/// - The clip path as output
pub fn build_encode_command(
    ffmpeg: &Path,
    streams: &CapturedStreams,
    output: &Path,
    bitrate_kbps: u32,
) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-y");
    cmd.arg("-i").arg(&streams.video);
    cmd.arg("-i").arg(&streams.audio);
    cmd.arg("-b:v").arg(format!("{}k", bitrate_kbps));
    cmd.arg(output);
    cmd
}

/// Build the command that joins the clips listed in a concat manifest
///
/// Streams are copied, so the clips must share encoding settings.
pub fn build_concat_command(ffmpeg: &Path, manifest: &Path, output: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-y");
    cmd.arg("-f").arg("concat");
    cmd.arg("-safe").arg("0");
    cmd.arg("-i").arg(manifest);
    cmd.arg("-c").arg("copy");
    cmd.arg(output);
    cmd
}

fn run(mut cmd: Command) -> Result<(), EncodeError> {
    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    check_status(status)
}

fn check_status(status: ExitStatus) -> Result<(), EncodeError> {
    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(EncodeError::Failed(code)),
            None => Err(EncodeError::Terminated),
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, streams: &CapturedStreams, output: &Path) -> Result<(), EncodeError> {
        run(build_encode_command(
            &self.ffmpeg,
            streams,
            output,
            self.bitrate_kbps,
        ))
    }

    fn concat(&self, manifest: &Path, output: &Path) -> Result<(), EncodeError> {
        run(build_concat_command(&self.ffmpeg, manifest, output))
    }
}
