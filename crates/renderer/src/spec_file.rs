//! Spec file parsing
//!
//! A spec file lists sets as blank-line separated blocks. The first line of a block is
//! the set name; every following line is a replay path, optionally wrapped in double
//! quotes:
//!
//! ```text
//! Winners Finals: Alice vs Bob
//! "/replays/Game_20230101T120000.slp"
//! /replays/Game_20230101T121500.slp
//!
//! Grand Finals
//! /replays/Game_20230101T130000.slp
//! ```

use crate::replay_set::{is_replay_file, ReplaySet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for spec file loading
#[derive(Debug, Error)]
pub enum SpecError {
    /// Spec file could not be read
    #[error("Failed to read spec file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A listed replay does not exist
    #[error("File for set \"{set}\" doesn't exist: {path}")]
    MissingReplay { set: String, path: PathBuf },
}

/// Read and parse a spec file
pub fn parse_spec_file<P: AsRef<Path>>(path: P) -> Result<Vec<ReplaySet>, SpecError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_spec(&content)
}

/// Parse spec file content into sets, in file order
///
/// Listed paths must exist, otherwise the whole parse fails. Existing paths without the
/// replay extension are skipped with a warning. Blocks left without replays are dropped.
pub fn parse_spec(content: &str) -> Result<Vec<ReplaySet>, SpecError> {
    let mut sets = Vec::new();
    let mut current: Option<(String, Vec<PathBuf>)> = None;

    for raw_line in content.lines() {
        let line = raw_line.trim();

        if line.is_empty() {
            push_block(&mut sets, current.take());
            continue;
        }

        match current.as_mut() {
            None => current = Some((line.to_string(), Vec::new())),
            Some((name, replays)) => {
                let path = PathBuf::from(strip_quotes(line));
                if !path.exists() {
                    return Err(SpecError::MissingReplay {
                        set: name.clone(),
                        path,
                    });
                }
                if is_replay_file(&path) {
                    replays.push(path);
                } else {
                    tracing::warn!(
                        set = %name,
                        path = %path.display(),
                        "Ignoring non-replay file"
                    );
                }
            }
        }
    }
    push_block(&mut sets, current);

    Ok(sets)
}

fn push_block(sets: &mut Vec<ReplaySet>, block: Option<(String, Vec<PathBuf>)>) {
    if let Some((name, replays)) = block {
        if !replays.is_empty() {
            sets.push(ReplaySet::new(name, replays));
        }
    }
}

fn strip_quotes(line: &str) -> &str {
    let line = line.strip_prefix('"').unwrap_or(line);
    line.strip_suffix('"').unwrap_or(line)
}
