//! Replay metadata
//!
//! Metadata comes from an external replay parser behind the [`ReplayParser`] trait.
//! The bundled [`CommandReplayParser`] runs the configured tool and reads JSON from
//! its stdout.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Error type for metadata reads
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Parser could not be started
    #[error("Failed to run replay parser for {replay}: {source}")]
    Io {
        replay: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parser rejected the replay
    #[error("Replay parser failed for {replay} (exit code {code:?}): {stderr}")]
    Failed {
        replay: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    /// Parser output was not the expected JSON
    #[error("Invalid replay parser output for {replay}: {source}")]
    InvalidOutput {
        replay: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Who occupied a controller port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerType {
    Human,
    Cpu,
    Absent,
}

/// One controller port of a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSlot {
    #[serde(rename = "type")]
    pub player_type: PlayerType,
    #[serde(default)]
    pub character: Option<u8>,
    #[serde(default)]
    pub costume: Option<u8>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Metadata of a single replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMetadata {
    /// Length of the game in frames
    pub duration_frames: u64,
    /// Controller ports in port order
    #[serde(default)]
    pub players: Vec<PlayerSlot>,
    #[serde(default)]
    pub stage: Option<u16>,
    #[serde(default)]
    pub end_condition: Option<u8>,
    /// Capture start time as recorded by the console
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Source of replay metadata
///
/// `lightweight` asks for a metadata-only read that skips per-frame decoding.
pub trait ReplayParser: Send + Sync {
    fn read_metadata(&self, replay: &Path, lightweight: bool)
        -> Result<ReplayMetadata, MetadataError>;
}

/// Runs an external replay parser and reads its JSON output
#[derive(Debug, Clone)]
pub struct CommandReplayParser {
    program: PathBuf,
}

impl CommandReplayParser {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths.replay_parser.clone())
    }
}

/// Build the parser invocation for one replay
pub fn build_metadata_command(program: &Path, replay: &Path, lightweight: bool) -> Command {
    let mut cmd = Command::new(program);
    if lightweight {
        cmd.arg("--skip-frames");
    }
    cmd.arg(replay);
    cmd.stdin(Stdio::null());
    cmd
}

impl ReplayParser for CommandReplayParser {
    fn read_metadata(
        &self,
        replay: &Path,
        lightweight: bool,
    ) -> Result<ReplayMetadata, MetadataError> {
        let output = build_metadata_command(&self.program, replay, lightweight)
            .output()
            .map_err(|source| MetadataError::Io {
                replay: replay.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(MetadataError::Failed {
                replay: replay.to_path_buf(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|source| MetadataError::InvalidOutput {
            replay: replay.to_path_buf(),
            source,
        })
    }
}
