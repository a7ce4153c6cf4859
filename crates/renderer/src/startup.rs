//! Startup checks module
//!
//! Preflight checks run once before any set is rendered:
//! - Encoder availability (`ffmpeg -version` must succeed)
//! - Emulator and game image are regular files

use crate::config::Config;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error("Not a file: {0}")]
    NotAFile(String),
}

/// Parse encoder version output and extract the major version number
///
/// Handles both `ffmpeg version 6.1 ...` and git-style `ffmpeg version n6.1-...`.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');
    let major_str = version_str.split(|c| c == '.' || c == '-').next()?;

    major_str.parse().ok()
}

/// Check that the encoder runs
///
/// Returns the detected major version, if the output could be parsed.
pub fn check_encoder_available(ffmpeg: &Path) -> Result<Option<u32>, StartupError> {
    let output = Command::new(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            StartupError::EncoderUnavailable(format!(
                "{} -version failed; is ffmpeg installed? Error: {}",
                ffmpeg.display(),
                e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::EncoderUnavailable(format!(
            "{} -version exited with {}",
            ffmpeg.display(),
            output.status
        )));
    }

    Ok(parse_ffmpeg_version(&String::from_utf8_lossy(&output.stdout)))
}

fn check_is_file(path: &Path) -> Result<(), StartupError> {
    if !path.is_file() {
        return Err(StartupError::NotAFile(path.display().to_string()));
    }
    Ok(())
}

/// Run all startup checks in order
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_is_file(&cfg.paths.dolphin)?;
    check_is_file(&cfg.paths.melee_iso)?;

    match check_encoder_available(&cfg.paths.ffmpeg)? {
        Some(major) => tracing::info!(version = major, "Found ffmpeg"),
        None => tracing::warn!("Could not determine ffmpeg version"),
    }

    Ok(())
}
