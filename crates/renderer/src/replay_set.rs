//! Replay sets
//!
//! A [`ReplaySet`] is a named, ordered list of replays that becomes one output video.
//! Its metadata is read lazily, once, on first request and kept for the lifetime of
//! the set.

use crate::metadata::{ReplayMetadata, ReplayParser};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// File extension of replay files
pub const REPLAY_EXTENSION: &str = "slp";

/// Extension of every produced video
pub const VIDEO_EXTENSION: &str = "mp4";

/// Metadata of one replay that parsed successfully
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReplay {
    pub path: PathBuf,
    pub metadata: ReplayMetadata,
}

/// A named group of replays rendered into a single video
#[derive(Debug)]
pub struct ReplaySet {
    name: String,
    replays: Vec<PathBuf>,
    metadata: OnceLock<Vec<ParsedReplay>>,
}

impl ReplaySet {
    pub fn new(name: impl Into<String>, replays: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            replays,
            metadata: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replays in the order they were listed
    pub fn replays(&self) -> &[PathBuf] {
        &self.replays
    }

    pub fn len(&self) -> usize {
        self.replays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replays.is_empty()
    }

    /// Output file name: the set name stripped to letters, digits, space, `_`, `(`, `)`
    pub fn output_filename(&self) -> String {
        format!("{}.{}", sanitize_name(&self.name), VIDEO_EXTENSION)
    }

    /// Lightweight metadata for every replay that could be parsed
    ///
    /// The first call reads every replay through `parser`; later calls return the stored
    /// result without touching the parser again. Replays that fail to parse are logged
    /// and left out.
    pub fn metadata(&self, parser: &dyn ReplayParser) -> &[ParsedReplay] {
        self.metadata.get_or_init(|| {
            self.replays
                .iter()
                .filter_map(|path| match parser.read_metadata(path, true) {
                    Ok(metadata) => Some(ParsedReplay {
                        path: path.clone(),
                        metadata,
                    }),
                    Err(e) => {
                        tracing::error!(
                            set = %self.name,
                            replay = %path.display(),
                            error = %e,
                            "Failed to parse replay"
                        );
                        None
                    }
                })
                .collect()
        })
    }
}

/// Keep only letters, digits, space, underscore and parentheses, then trim
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whether `path` carries the replay extension
pub fn is_replay_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == REPLAY_EXTENSION)
        .unwrap_or(false)
}
