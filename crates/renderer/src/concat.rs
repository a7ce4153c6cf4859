//! Clip concatenation
//!
//! Orders a set's finished clips, writes them to a concat manifest and has the encoder
//! join them into the set's video.

use crate::encode::{EncodeError, Encoder};
use crate::replay_set::VIDEO_EXTENSION;
use crate::scheduler::RenderedClip;
use crate::workspace::TempWorkspace;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// File name of the manifest inside its workspace
pub const MANIFEST_FILE_NAME: &str = "concat_file.txt";

/// Error type for concatenation
#[derive(Debug, Error)]
pub enum ConcatError {
    /// Nothing to concatenate
    #[error("No clips to combine for {0}")]
    Empty(PathBuf),

    /// A listed clip does not exist
    #[error("Cannot combine clip because it doesn't exist: {0}")]
    MissingClip(PathBuf),

    /// A listed clip is not an mp4
    #[error("Cannot combine non-mp4 file: {0}")]
    NotVideo(PathBuf),

    /// Failed to create the manifest workspace or write the manifest
    #[error("Failed to write concat manifest: {0}")]
    Manifest(#[from] std::io::Error),

    /// Encoder failed
    #[error("Concatenation failed: {0}")]
    Encode(#[from] EncodeError),

    /// Encoder reported success but produced nothing
    #[error("Failed to create: {0}")]
    OutputMissing(PathBuf),

    /// A video left over from an earlier run could not be removed
    #[error("Failed to remove existing {path}: {source}")]
    StaleOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Order in which a set's clips appear in its video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipOrder {
    /// Ascending by source replay file name, which starts with the capture timestamp
    #[default]
    Chronological,
    /// Exactly the order the replays were listed in
    AsListed,
}

/// Clip paths in final video order
pub fn order_clips(clips: &[RenderedClip], order: ClipOrder) -> Vec<PathBuf> {
    let mut ordered: Vec<&RenderedClip> = clips.iter().collect();
    if order == ClipOrder::Chronological {
        // Stable, so equal file names keep their listed order
        ordered.sort_by(|a, b| a.source.file_name().cmp(&b.source.file_name()));
    }
    ordered.into_iter().map(|c| c.clip.clone()).collect()
}

/// Ordered list of clips handed to the encoder's concat demuxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatManifest {
    entries: Vec<PathBuf>,
}

impl ConcatManifest {
    /// Validate that every entry is an existing mp4
    pub fn new(entries: Vec<PathBuf>) -> Result<Self, ConcatError> {
        for entry in &entries {
            if !entry.exists() {
                return Err(ConcatError::MissingClip(entry.clone()));
            }
            let is_video = entry
                .extension()
                .map(|ext| ext == VIDEO_EXTENSION)
                .unwrap_or(false);
            if !is_video {
                return Err(ConcatError::NotVideo(entry.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Manifest text, one `file '<path>'` line per clip
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("file '{}'\n", escape_quotes(&entry.to_string_lossy())))
            .collect()
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.render())
    }
}

/// Remove a video left at `output` by an earlier run, so only this run's output counts
fn remove_stale_output(output: &Path) -> Result<(), ConcatError> {
    match fs::remove_file(output) {
        Ok(()) => {
            tracing::info!(output = %output.display(), "Replacing existing video");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ConcatError::StaleOutput {
            path: output.to_path_buf(),
            source,
        }),
    }
}

/// Remove whatever a failed concatenation left behind
fn discard_partial_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => tracing::warn!(output = %output.display(), "Removed partial video"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(output = %output.display(), error = %e, "Failed to remove partial video")
        }
    }
}

/// Escape single quotes for the concat demuxer's quoted strings
fn escape_quotes(path: &str) -> String {
    path.replace('\'', "'\\''")
}

/// Joins finished clips into one video
#[derive(Clone)]
pub struct Concatenator {
    encoder: Arc<dyn Encoder>,
    temp_base_dir: PathBuf,
}

impl Concatenator {
    pub fn new(encoder: Arc<dyn Encoder>, temp_base_dir: PathBuf) -> Self {
        Self {
            encoder,
            temp_base_dir,
        }
    }

    /// Concatenate `clips` into `output` in the given order
    ///
    /// Fails before touching the encoder when `clips` is empty or any clip is missing.
    /// An existing file at `output` is removed first and a failed run leaves nothing
    /// there. The output must exist afterwards; the encoder's exit status alone is not
    /// trusted.
    pub fn concat(
        &self,
        clips: &[RenderedClip],
        order: ClipOrder,
        output: &Path,
    ) -> Result<(), ConcatError> {
        if clips.is_empty() {
            return Err(ConcatError::Empty(output.to_path_buf()));
        }

        let manifest = ConcatManifest::new(order_clips(clips, order))?;

        {
            let workspace = TempWorkspace::create(&self.temp_base_dir, "concat")?;
            let manifest_path = workspace.join(MANIFEST_FILE_NAME);
            manifest.write_to(&manifest_path)?;

            tracing::info!(
                output = %output.display(),
                clips = manifest.entries().len(),
                "Combining clips"
            );
            remove_stale_output(output)?;
            if let Err(e) = self.encoder.concat(&manifest_path, output) {
                discard_partial_output(output);
                return Err(e.into());
            }
        }

        if !output.exists() {
            return Err(ConcatError::OutputMissing(output.to_path_buf()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CapturedStreams;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the manifest it was given and writes the output unless `silent`
    #[derive(Default)]
    struct RecordingEncoder {
        silent: bool,
        fail_after_writing: bool,
        calls: AtomicUsize,
        manifest_text: Mutex<Option<String>>,
        manifest_path: Mutex<Option<PathBuf>>,
    }

    impl Encoder for RecordingEncoder {
        fn encode(&self, _streams: &CapturedStreams, _output: &Path) -> Result<(), EncodeError> {
            Ok(())
        }

        fn concat(&self, manifest: &Path, output: &Path) -> Result<(), EncodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.manifest_text.lock().unwrap() = Some(fs::read_to_string(manifest)?);
            *self.manifest_path.lock().unwrap() = Some(manifest.to_path_buf());
            if !self.silent {
                fs::write(output, b"joined")?;
            }
            if self.fail_after_writing {
                return Err(EncodeError::Failed(1));
            }
            Ok(())
        }
    }

    fn clip(dir: &TempDir, source: &str, clip_name: &str) -> RenderedClip {
        let clip = dir.path().join(clip_name);
        fs::write(&clip, b"clip").unwrap();
        RenderedClip {
            source: PathBuf::from(format!("/replays/{}", source)),
            clip,
        }
    }

    fn unsorted_clips(dir: &TempDir) -> Vec<RenderedClip> {
        vec![
            clip(dir, "Game_20230101T130000.slp", "game1.mp4"),
            clip(dir, "Game_20230101T120000.slp", "game2.mp4"),
            clip(dir, "Game_20230101T123000.slp", "game3.mp4"),
        ]
    }

    #[test]
    fn test_chronological_order_sorts_by_source_file_name() {
        let dir = TempDir::new().unwrap();
        let clips = unsorted_clips(&dir);

        let ordered = order_clips(&clips, ClipOrder::Chronological);
        assert_eq!(
            ordered,
            vec![
                dir.path().join("game2.mp4"),
                dir.path().join("game3.mp4"),
                dir.path().join("game1.mp4"),
            ]
        );
    }

    #[test]
    fn test_sort_ignores_directories() {
        let dir = TempDir::new().unwrap();
        let mut a = clip(&dir, "Game_2.slp", "game1.mp4");
        a.source = PathBuf::from("/a/Game_2.slp");
        let mut b = clip(&dir, "Game_1.slp", "game2.mp4");
        b.source = PathBuf::from("/z/Game_1.slp");

        let ordered = order_clips(&[a, b], ClipOrder::Chronological);
        assert_eq!(ordered[0], dir.path().join("game2.mp4"));
    }

    #[test]
    fn test_as_listed_order_is_preserved() {
        let dir = TempDir::new().unwrap();
        let clips = unsorted_clips(&dir);

        let ordered = order_clips(&clips, ClipOrder::AsListed);
        let expected: Vec<_> = clips.iter().map(|c| c.clip.clone()).collect();
        assert_eq!(ordered, expected);
    }

    #[test]
    fn test_manifest_render_escapes_quotes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("it's.mp4");
        fs::write(&path, b"clip").unwrap();

        let manifest = ConcatManifest::new(vec![path.clone()]).unwrap();
        let expected = format!(
            "file '{}'\n",
            path.to_string_lossy().replace('\'', "'\\''")
        );
        assert_eq!(manifest.render(), expected);
        assert!(manifest.render().contains("it'\\''s.mp4"));
    }

    #[test]
    fn test_manifest_rejects_missing_and_non_video_entries() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.mp4");
        assert!(matches!(
            ConcatManifest::new(vec![missing]),
            Err(ConcatError::MissingClip(_))
        ));

        let avi = dir.path().join("framedump0.avi");
        fs::write(&avi, b"raw").unwrap();
        assert!(matches!(
            ConcatManifest::new(vec![avi]),
            Err(ConcatError::NotVideo(_))
        ));
    }

    #[test]
    fn test_concat_writes_ordered_manifest_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let concatenator = Concatenator::new(encoder.clone(), temp.path().to_path_buf());
        let output = dir.path().join("Grand Finals.mp4");

        concatenator
            .concat(&unsorted_clips(&dir), ClipOrder::Chronological, &output)
            .unwrap();

        assert!(output.exists());
        let text = encoder.manifest_text.lock().unwrap().clone().unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("game2.mp4'"));
        assert!(lines[2].ends_with("game1.mp4'"));

        let manifest_path = encoder.manifest_path.lock().unwrap().clone().unwrap();
        assert_eq!(manifest_path.file_name().unwrap(), MANIFEST_FILE_NAME);
        assert!(!manifest_path.exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_clip_list_fails_before_encoder() {
        let temp = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let concatenator = Concatenator::new(encoder.clone(), temp.path().to_path_buf());

        let err = concatenator
            .concat(&[], ClipOrder::Chronological, &temp.path().join("out.mp4"))
            .unwrap_err();

        assert!(matches!(err, ConcatError::Empty(_)));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_clip_fails_before_encoder() {
        let dir = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let concatenator = Concatenator::new(encoder.clone(), temp.path().to_path_buf());

        let clips = unsorted_clips(&dir);
        fs::remove_file(&clips[1].clip).unwrap();

        let err = concatenator
            .concat(&clips, ClipOrder::AsListed, &dir.path().join("out.mp4"))
            .unwrap_err();

        assert!(matches!(err, ConcatError::MissingClip(_)));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_silent_encoder_output_missing_and_workspace_removed() {
        let dir = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder {
            silent: true,
            ..RecordingEncoder::default()
        });
        let concatenator = Concatenator::new(encoder.clone(), temp.path().to_path_buf());
        let output = dir.path().join("out.mp4");

        let err = concatenator
            .concat(&unsorted_clips(&dir), ClipOrder::Chronological, &output)
            .unwrap_err();

        assert!(matches!(err, ConcatError::OutputMissing(ref p) if p == &output));
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_leftover_output_does_not_hide_silent_encoder() {
        let dir = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder {
            silent: true,
            ..RecordingEncoder::default()
        });
        let concatenator = Concatenator::new(encoder, temp.path().to_path_buf());
        let output = dir.path().join("Finals.mp4");
        fs::write(&output, b"video from last week").unwrap();

        let err = concatenator
            .concat(&unsorted_clips(&dir), ClipOrder::Chronological, &output)
            .unwrap_err();

        assert!(matches!(err, ConcatError::OutputMissing(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_leftover_output_is_replaced() {
        let dir = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let concatenator = Concatenator::new(
            Arc::new(RecordingEncoder::default()),
            temp.path().to_path_buf(),
        );
        let output = dir.path().join("Finals.mp4");
        fs::write(&output, b"video from last week").unwrap();

        concatenator
            .concat(&unsorted_clips(&dir), ClipOrder::Chronological, &output)
            .unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"joined");
    }

    #[test]
    fn test_failed_encoder_leaves_no_partial_output() {
        let dir = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder {
            fail_after_writing: true,
            ..RecordingEncoder::default()
        });
        let concatenator = Concatenator::new(encoder, temp.path().to_path_buf());
        let output = dir.path().join("Finals.mp4");

        let err = concatenator
            .concat(&unsorted_clips(&dir), ClipOrder::Chronological, &output)
            .unwrap_err();

        assert!(matches!(err, ConcatError::Encode(EncodeError::Failed(1))));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
