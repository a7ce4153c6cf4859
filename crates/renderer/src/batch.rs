//! Batch driver
//!
//! Walks every set in order: preview estimates up front, then for each set the capture
//! scheduler followed by the concatenator. A failed set is recorded and the batch moves on.

use crate::capture::{Capture, DolphinCapture};
use crate::concat::{ClipOrder, ConcatError, Concatenator};
use crate::concurrency::{derive_plan, ConcurrencyPlan};
use crate::config::Config;
use crate::encode::{Encoder, FfmpegEncoder};
use crate::estimate::SetEstimate;
use crate::metadata::{CommandReplayParser, ReplayParser};
use crate::replay_set::ReplaySet;
use crate::scheduler::{CaptureScheduler, SchedulerError};
use crate::workspace::TempWorkspace;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Error type for rendering one set
#[derive(Debug, Error)]
pub enum SetError {
    /// Destination directory could not be created
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Set workspace could not be created
    #[error("Failed to create set workspace: {0}")]
    Workspace(#[source] std::io::Error),

    /// One or more capture jobs failed
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Clips could not be combined
    #[error(transparent)]
    Concat(#[from] ConcatError),

    /// The concatenation task panicked or was cancelled
    #[error("Concatenation task aborted: {0}")]
    Aborted(String),
}

/// Preview of a single set
#[derive(Debug, Clone, PartialEq)]
pub struct SetPreview {
    pub name: String,
    pub replays: Vec<PathBuf>,
    pub estimate: SetEstimate,
}

/// Preview of the whole batch, shown before anything is rendered
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPreview {
    pub sets: Vec<SetPreview>,
    pub parallel_games: u32,
}

impl BatchPreview {
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn replay_count(&self) -> usize {
        self.sets.iter().map(|s| s.estimate.replay_count).sum()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.sets.iter().map(|s| s.estimate.total_duration_ms).sum()
    }

    /// Sets render one after another, so their processing times add up
    pub fn processing_time_ms(&self) -> u64 {
        self.sets.iter().map(|s| s.estimate.processing_time_ms).sum()
    }

    /// `None` if any set's size is unknown
    pub fn approx_size_bytes(&self) -> Option<u64> {
        self.sets
            .iter()
            .map(|s| s.estimate.approx_size_bytes)
            .sum::<Option<u64>>()
    }
}

/// A set that produced its video
#[derive(Debug, Clone, PartialEq)]
pub struct SetSuccess {
    pub name: String,
    pub output: PathBuf,
    pub size_bytes: u64,
}

/// A set that did not produce a video
#[derive(Debug)]
pub struct SetFailure {
    pub name: String,
    pub error: SetError,
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<SetSuccess>,
    pub failed: Vec<SetFailure>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives previews and rendering for a list of sets
pub struct BatchDriver {
    /// Validated configuration
    pub config: Config,
    /// Derived concurrency plan
    pub concurrency_plan: ConcurrencyPlan,
    parser: Arc<dyn ReplayParser>,
    scheduler: CaptureScheduler,
    concatenator: Concatenator,
    temp_base_dir: PathBuf,
}

impl BatchDriver {
    /// Build a driver backed by the emulator, encoder and replay parser from `config`
    ///
    /// Startup checks are not run here; the caller decides whether to run them.
    pub fn new(config: Config, temp_base_dir: PathBuf) -> Self {
        let plan = derive_plan(&config);
        let capture = Arc::new(DolphinCapture::from_config(&config));
        let encoder = Arc::new(FfmpegEncoder::from_config(&config));
        let parser = Arc::new(CommandReplayParser::from_config(&config));
        Self::with_collaborators(config, plan, capture, encoder, parser, temp_base_dir)
    }

    /// Build a driver with explicit collaborators
    pub fn with_collaborators(
        config: Config,
        concurrency_plan: ConcurrencyPlan,
        capture: Arc<dyn Capture>,
        encoder: Arc<dyn Encoder>,
        parser: Arc<dyn ReplayParser>,
        temp_base_dir: PathBuf,
    ) -> Self {
        let scheduler = CaptureScheduler::new(
            concurrency_plan.clone(),
            capture,
            encoder.clone(),
            parser.clone(),
            temp_base_dir.clone(),
            &config.render,
        );
        let concatenator = Concatenator::new(encoder, temp_base_dir.clone());

        Self {
            config,
            concurrency_plan,
            parser,
            scheduler,
            concatenator,
            temp_base_dir,
        }
    }

    /// Estimate every set
    ///
    /// Reads lightweight metadata on first use; the result stays cached on each set.
    pub fn preview(&self, sets: &[ReplaySet]) -> BatchPreview {
        let parallel = self.concurrency_plan.parallel_games;
        let sets = sets
            .iter()
            .map(|set| SetPreview {
                name: set.name().to_string(),
                replays: set.replays().to_vec(),
                estimate: SetEstimate::for_set(set, self.parser.as_ref(), &self.config, parallel),
            })
            .collect();

        BatchPreview {
            sets,
            parallel_games: parallel,
        }
    }

    /// Render one set into `dest_dir`, returning the path of its video
    ///
    /// Clips live in a set workspace that is removed when this returns, whatever the
    /// outcome. Any failed capture job means no video for the set.
    pub async fn render_set(
        &self,
        set: &ReplaySet,
        dest_dir: &Path,
        order: ClipOrder,
    ) -> Result<PathBuf, SetError> {
        fs::create_dir_all(dest_dir).map_err(|source| SetError::OutputDir {
            path: dest_dir.to_path_buf(),
            source,
        })?;

        let workspace =
            TempWorkspace::create(&self.temp_base_dir, "set").map_err(SetError::Workspace)?;
        let clips = self.scheduler.run(set.replays(), workspace.path()).await?;

        let output = dest_dir.join(set.output_filename());
        let concatenator = self.concatenator.clone();
        let concat_output = output.clone();
        tokio::task::spawn_blocking(move || concatenator.concat(&clips, order, &concat_output))
            .await
            .map_err(|e| SetError::Aborted(e.to_string()))??;

        Ok(output)
    }

    /// Render every set in order
    ///
    /// A failed set is logged and recorded; later sets still run.
    pub async fn run(&self, sets: &[ReplaySet], dest_dir: &Path, order: ClipOrder) -> BatchReport {
        let mut report = BatchReport::default();

        for set in sets {
            let started = Instant::now();
            tracing::info!(set = set.name(), replays = set.len(), "Rendering set");

            match self.render_set(set, dest_dir, order).await {
                Ok(output) => {
                    let size_bytes = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
                    tracing::info!(
                        set = set.name(),
                        output = %output.display(),
                        size_bytes,
                        elapsed_secs = started.elapsed().as_secs(),
                        "Set rendered"
                    );
                    report.succeeded.push(SetSuccess {
                        name: set.name().to_string(),
                        output,
                        size_bytes,
                    });
                }
                Err(error) => {
                    tracing::error!(set = set.name(), error = %error, "Set failed");
                    report.failed.push(SetFailure {
                        name: set.name().to_string(),
                        error,
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, CapturedStreams};
    use crate::encode::EncodeError;
    use crate::metadata::{MetadataError, ReplayMetadata};
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Frame counts by file name; unknown names fail to parse
    struct MapParser {
        frames: HashMap<String, u64>,
    }

    impl MapParser {
        fn new(entries: &[(&str, u64)]) -> Self {
            Self {
                frames: entries
                    .iter()
                    .map(|(name, frames)| (name.to_string(), *frames))
                    .collect(),
            }
        }
    }

    impl ReplayParser for MapParser {
        fn read_metadata(
            &self,
            replay: &Path,
            _lightweight: bool,
        ) -> Result<ReplayMetadata, MetadataError> {
            let name = replay
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match self.frames.get(&name) {
                Some(frames) => Ok(ReplayMetadata {
                    duration_frames: *frames,
                    players: Vec::new(),
                    stage: None,
                    end_condition: None,
                    timestamp: None,
                }),
                None => Err(MetadataError::Failed {
                    replay: replay.to_path_buf(),
                    code: Some(1),
                    stderr: "corrupt replay".to_string(),
                }),
            }
        }
    }

    /// Fails for replays whose path contains "crash"
    struct FakeCapture;

    impl Capture for FakeCapture {
        fn capture(
            &self,
            replay: &Path,
            _frames: u64,
            workdir: &Path,
        ) -> Result<CapturedStreams, CaptureError> {
            if replay.to_string_lossy().contains("crash") {
                return Err(CaptureError::Failed(1));
            }
            let streams = CapturedStreams {
                video: workdir.join("framedump0.avi"),
                audio: workdir.join("dspdump.wav"),
            };
            fs::write(&streams.video, b"video")?;
            fs::write(&streams.audio, b"audio")?;
            Ok(streams)
        }
    }

    /// Writes clips, and copies the manifest text into the joined output
    struct FakeEncoder;

    impl Encoder for FakeEncoder {
        fn encode(&self, _streams: &CapturedStreams, output: &Path) -> Result<(), EncodeError> {
            fs::write(output, b"clip")?;
            Ok(())
        }

        fn concat(&self, manifest: &Path, output: &Path) -> Result<(), EncodeError> {
            fs::copy(manifest, output)?;
            Ok(())
        }
    }

    /// Writes clips but never the joined video
    struct SilentConcatEncoder;

    impl Encoder for SilentConcatEncoder {
        fn encode(&self, _streams: &CapturedStreams, output: &Path) -> Result<(), EncodeError> {
            fs::write(output, b"clip")?;
            Ok(())
        }

        fn concat(&self, _manifest: &Path, _output: &Path) -> Result<(), EncodeError> {
            Ok(())
        }
    }

    fn create_test_config() -> Config {
        Config::parse_toml(
            r#"
[paths]
dolphin = "/opt/dolphin"
melee_iso = "/games/melee.iso"
ffmpeg = "ffmpeg"
replay_parser = "/usr/bin/slp-metadata"
"#,
        )
        .unwrap()
    }

    fn driver(temp: &Path, parser: MapParser) -> BatchDriver {
        BatchDriver::with_collaborators(
            create_test_config(),
            ConcurrencyPlan {
                physical_cores: 4,
                parallel_games: 2,
            },
            Arc::new(FakeCapture),
            Arc::new(FakeEncoder),
            Arc::new(parser),
            temp.to_path_buf(),
        )
    }

    fn set(name: &str, files: &[&str]) -> ReplaySet {
        ReplaySet::new(
            name,
            files
                .iter()
                .map(|f| PathBuf::from(format!("/replays/{}", f)))
                .collect(),
        )
    }

    #[test]
    fn test_driver_uses_configured_parallelism() {
        let temp = TempDir::new().unwrap();
        let driver = driver(temp.path(), MapParser::new(&[]));
        assert_eq!(driver.concurrency_plan.parallel_games, 2);
        assert_eq!(driver.scheduler.available_permits(), 2);
    }

    #[test]
    fn test_preview_totals() {
        let temp = TempDir::new().unwrap();
        let parser = MapParser::new(&[("a1.slp", 600), ("a2.slp", 1200), ("b1.slp", 1800)]);
        let driver = driver(temp.path(), parser);
        let sets = vec![
            set("Set A", &["a1.slp", "a2.slp", "broken.slp"]),
            set("Set B", &["b1.slp"]),
        ];

        let preview = driver.preview(&sets);

        assert_eq!(preview.set_count(), 2);
        assert_eq!(preview.replay_count(), 4);
        assert_eq!(preview.sets[0].estimate.parsed_count, 2);
        assert_eq!(preview.sets[0].estimate.skipped_count(), 1);
        assert_eq!(preview.total_duration_ms(), 60_000);
        // Set A: both games fit in one chunk of two; set B: one game
        assert_eq!(preview.processing_time_ms(), 20_000 + 30_000);
        assert!(preview.approx_size_bytes().is_some());
    }

    #[test]
    fn test_preview_size_unknown_when_uncalibrated() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(temp.path(), MapParser::new(&[("a1.slp", 600)]));
        driver.config.video.bitrate_kbps = 8000;

        let preview = driver.preview(&[set("Set A", &["a1.slp"])]);
        assert_eq!(preview.approx_size_bytes(), None);
    }

    #[tokio::test]
    async fn test_failed_job_fails_only_its_set() {
        let temp = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let parser = MapParser::new(&[
            ("a1.slp", 600),
            ("crash.slp", 600),
            ("a3.slp", 600),
            ("b1.slp", 600),
        ]);
        let driver = driver(temp.path(), parser);
        let sets = vec![
            set("Set A", &["a1.slp", "crash.slp", "a3.slp"]),
            set("Set B", &["b1.slp"]),
        ];

        let report = driver.run(&sets, dest.path(), ClipOrder::Chronological).await;

        assert_eq!(report.processed(), 2);
        assert!(!report.all_succeeded());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "Set A");
        match &report.failed[0].error {
            SetError::Scheduler(SchedulerError::JobsFailed { total, failures }) => {
                assert_eq!(*total, 3);
                assert_eq!(failures.len(), 1);
                assert!(failures[0].replay().ends_with("crash.slp"));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(!dest.path().join("Set A.mp4").exists());
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].output, dest.path().join("Set B.mp4"));
        assert!(report.succeeded[0].size_bytes > 0);

        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_render_set_orders_clips_chronologically() {
        let temp = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let parser = MapParser::new(&[
            ("Game_20230101T130000.slp", 600),
            ("Game_20230101T120000.slp", 600),
        ]);
        let driver = driver(temp.path(), parser);
        let set = set(
            "Pools: Round 1",
            &["Game_20230101T130000.slp", "Game_20230101T120000.slp"],
        );

        let output = driver
            .render_set(&set, dest.path(), ClipOrder::Chronological)
            .await
            .unwrap();

        assert_eq!(output, dest.path().join("Pools Round 1.mp4"));
        let manifest = fs::read_to_string(&output).unwrap();
        let lines: Vec<_> = manifest.lines().collect();
        // game2 was rendered from the earlier replay
        assert!(lines[0].ends_with("game2.mp4'"));
        assert!(lines[1].ends_with("game1.mp4'"));
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_render_set_creates_destination() {
        let temp = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let nested = dest.path().join("videos");
        let driver = driver(temp.path(), MapParser::new(&[("a1.slp", 600)]));

        driver
            .render_set(&set("Solo", &["a1.slp"]), &nested, ClipOrder::AsListed)
            .await
            .unwrap();

        assert!(nested.join("Solo.mp4").exists());
    }

    #[tokio::test]
    async fn test_all_sets_succeed() {
        let temp = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let driver = driver(
            temp.path(),
            MapParser::new(&[("a1.slp", 600), ("b1.slp", 600)]),
        );
        let sets = vec![set("A", &["a1.slp"]), set("B", &["b1.slp"])];

        let report = driver.run(&sets, dest.path(), ClipOrder::AsListed).await;

        assert!(report.all_succeeded());
        assert_eq!(report.processed(), 2);
    }

    #[tokio::test]
    async fn test_video_from_earlier_run_is_not_reported_as_output() {
        let temp = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let stale = dest.path().join("Finals.mp4");
        fs::write(&stale, b"video from an earlier run").unwrap();

        let driver = BatchDriver::with_collaborators(
            create_test_config(),
            ConcurrencyPlan {
                physical_cores: 4,
                parallel_games: 2,
            },
            Arc::new(FakeCapture),
            Arc::new(SilentConcatEncoder),
            Arc::new(MapParser::new(&[("f1.slp", 600), ("f2.slp", 600)])),
            temp.path().to_path_buf(),
        );

        let report = driver
            .run(
                &[set("Finals", &["f1.slp", "f2.slp"])],
                dest.path(),
                ClipOrder::Chronological,
            )
            .await;

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0].error,
            SetError::Concat(ConcatError::OutputMissing(_))
        ));
        assert!(!stale.exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
