//! Capture scheduler
//!
//! Runs one capture + encode job per replay of a set, with concurrency limited by a
//! semaphore sized from the concurrency plan. Every job works in its own temporary
//! workspace and writes exactly one clip.

use crate::capture::{Capture, CaptureError};
use crate::config::RenderConfig;
use crate::encode::{EncodeError, Encoder};
use crate::metadata::{MetadataError, ReplayParser};
use crate::replay_set::VIDEO_EXTENSION;
use crate::workspace::TempWorkspace;
use crate::ConcurrencyPlan;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Error type for a single capture job, always naming the replay
#[derive(Debug, Error)]
pub enum JobError {
    /// Full metadata read failed
    #[error("Failed to read {replay}: {source}")]
    Metadata {
        replay: PathBuf,
        #[source]
        source: MetadataError,
    },

    /// Failed to create the job workspace
    #[error("Failed to create temp directory for {replay}: {source}")]
    Workspace {
        replay: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Capture failed
    #[error("Capture failed for {replay}: {source}")]
    Capture {
        replay: PathBuf,
        #[source]
        source: CaptureError,
    },

    /// Encoding failed
    #[error("Encode failed for {replay}: {source}")]
    Encode {
        replay: PathBuf,
        #[source]
        source: EncodeError,
    },

    /// Encoder reported success but wrote nothing
    #[error("No clip produced for {replay} at {clip}")]
    MissingClip { replay: PathBuf, clip: PathBuf },

    /// Job task panicked or was cancelled
    #[error("Job for {replay} did not finish: {message}")]
    Aborted { replay: PathBuf, message: String },
}

impl JobError {
    /// Replay the failed job was working on
    pub fn replay(&self) -> &Path {
        match self {
            JobError::Metadata { replay, .. }
            | JobError::Workspace { replay, .. }
            | JobError::Capture { replay, .. }
            | JobError::Encode { replay, .. }
            | JobError::MissingClip { replay, .. }
            | JobError::Aborted { replay, .. } => replay,
        }
    }
}

/// Error type for a scheduler run
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// One or more jobs failed; the set cannot be assembled
    #[error("{} of {} capture jobs failed", .failures.len(), .total)]
    JobsFailed {
        total: usize,
        failures: Vec<JobError>,
    },
}

/// Job state representing the current stage of a capture job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for a free slot
    Queued,
    /// Emulator is dumping frames
    Capturing,
    /// Encoder is writing the clip
    Encoding,
    /// Clip written
    Completed,
    /// Job failed
    Failed(String),
}

impl JobState {
    pub fn as_str(&self) -> &str {
        match self {
            JobState::Queued => "queued",
            JobState::Capturing => "capturing",
            JobState::Encoding => "encoding",
            JobState::Completed => "completed",
            JobState::Failed(_) => "failed",
        }
    }
}

/// One replay's worth of work
#[derive(Debug, Clone)]
pub struct CaptureJob {
    /// Replay to play back
    pub replay: PathBuf,
    /// Replay duration plus configured padding
    pub target_frames: u64,
    /// Where the finished clip goes
    pub clip_path: PathBuf,
    pub state: JobState,
}

impl CaptureJob {
    pub fn new(replay: PathBuf, target_frames: u64, clip_path: PathBuf) -> Self {
        Self {
            replay,
            target_frames,
            clip_path,
            state: JobState::Queued,
        }
    }

    fn transition(&mut self, state: JobState) {
        tracing::debug!(
            replay = %self.replay.display(),
            from = self.state.as_str(),
            to = state.as_str(),
            "Job state change"
        );
        self.state = state;
    }
}

/// A finished clip and the replay it was rendered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedClip {
    pub source: PathBuf,
    pub clip: PathBuf,
}

/// Clip file name for the job at `index` (zero-based)
pub fn clip_file_name(index: usize) -> String {
    format!("game{}.{}", index + 1, VIDEO_EXTENSION)
}

/// Everything a job needs, shared read-only between jobs
struct JobContext {
    capture: Arc<dyn Capture>,
    encoder: Arc<dyn Encoder>,
    parser: Arc<dyn ReplayParser>,
    temp_base_dir: PathBuf,
    extra_frames: u32,
    soft_ceiling: Option<Duration>,
}

impl JobContext {
    /// Read metadata, then capture and encode one replay
    fn execute(&self, replay: PathBuf, clip_path: PathBuf) -> Result<RenderedClip, JobError> {
        let metadata =
            self.parser
                .read_metadata(&replay, false)
                .map_err(|source| JobError::Metadata {
                    replay: replay.clone(),
                    source,
                })?;
        let target_frames = metadata.duration_frames + self.extra_frames as u64;
        let mut job = CaptureJob::new(replay, target_frames, clip_path);

        let result = self.run_job(&mut job);
        match &result {
            Ok(_) => job.transition(JobState::Completed),
            Err(e) => job.transition(JobState::Failed(e.to_string())),
        }
        result
    }

    fn run_job(&self, job: &mut CaptureJob) -> Result<RenderedClip, JobError> {
        let started = Instant::now();
        tracing::info!(
            replay = %job.replay.display(),
            frames = job.target_frames,
            "Starting capture"
        );

        // Dropped on every return below, including failures
        let workspace = TempWorkspace::create(&self.temp_base_dir, "capture").map_err(|source| {
            JobError::Workspace {
                replay: job.replay.clone(),
                source,
            }
        })?;

        job.transition(JobState::Capturing);
        let streams = self
            .capture
            .capture(&job.replay, job.target_frames, workspace.path())
            .map_err(|source| JobError::Capture {
                replay: job.replay.clone(),
                source,
            })?;

        job.transition(JobState::Encoding);
        self.encoder
            .encode(&streams, &job.clip_path)
            .map_err(|source| JobError::Encode {
                replay: job.replay.clone(),
                source,
            })?;

        if !job.clip_path.exists() {
            return Err(JobError::MissingClip {
                replay: job.replay.clone(),
                clip: job.clip_path.clone(),
            });
        }

        let elapsed = started.elapsed();
        tracing::info!(
            replay = %job.replay.display(),
            clip = %job.clip_path.display(),
            elapsed_secs = elapsed.as_secs(),
            "Created clip"
        );
        if let Some(ceiling) = self.soft_ceiling {
            if elapsed > ceiling {
                tracing::warn!(
                    replay = %job.replay.display(),
                    elapsed_secs = elapsed.as_secs(),
                    ceiling_secs = ceiling.as_secs(),
                    "Capture exceeded the configured render time ceiling"
                );
            }
        }

        Ok(RenderedClip {
            source: job.replay.clone(),
            clip: job.clip_path.clone(),
        })
    }
}

/// Bounded pool of capture jobs
///
/// Uses a tokio Semaphore to limit the number of concurrent jobs according to the
/// concurrency plan. The blocking capture and encode work runs on the blocking pool.
pub struct CaptureScheduler {
    semaphore: Arc<Semaphore>,
    concurrency_plan: ConcurrencyPlan,
    context: Arc<JobContext>,
}

impl CaptureScheduler {
    /// Create a new scheduler
    ///
    /// # Arguments
    /// * `plan` - Concurrency plan determining max concurrent jobs
    /// * `capture` / `encoder` / `parser` - External collaborators
    /// * `temp_base_dir` - Base directory for per-job workspaces
    /// * `render` - Frame padding and advisory time ceiling
    pub fn new(
        plan: ConcurrencyPlan,
        capture: Arc<dyn Capture>,
        encoder: Arc<dyn Encoder>,
        parser: Arc<dyn ReplayParser>,
        temp_base_dir: PathBuf,
        render: &RenderConfig,
    ) -> Self {
        let permits = plan.parallel_games.max(1) as usize;
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            concurrency_plan: plan,
            context: Arc::new(JobContext {
                capture,
                encoder,
                parser,
                temp_base_dir,
                extra_frames: render.extra_frames,
                soft_ceiling: render.render_time_ceiling_secs.map(Duration::from_secs),
            }),
        }
    }

    /// Get the number of available permits (slots for concurrent jobs)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn concurrency_plan(&self) -> &ConcurrencyPlan {
        &self.concurrency_plan
    }

    /// Try to acquire a permit without waiting
    pub fn try_acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Render every replay into a clip inside `clip_dir`
    ///
    /// Dispatches one job per replay and waits for all of them, whatever their outcome,
    /// before returning. Clips come back in replay order, independent of completion
    /// order. Any failed job fails the whole run; no job is retried.
    pub async fn run(
        &self,
        replays: &[PathBuf],
        clip_dir: &Path,
    ) -> Result<Vec<RenderedClip>, SchedulerError> {
        let handles: Vec<_> = replays
            .iter()
            .enumerate()
            .map(|(index, replay)| {
                let replay = replay.clone();
                let clip_path = clip_dir.join(clip_file_name(index));
                let semaphore = self.semaphore.clone();
                let context = self.context.clone();

                let handle = tokio::spawn({
                    let replay = replay.clone();
                    async move {
                        let _permit = semaphore.acquire_owned().await.map_err(|e| {
                            JobError::Aborted {
                                replay: replay.clone(),
                                message: e.to_string(),
                            }
                        })?;
                        let blocking_replay = replay.clone();
                        tokio::task::spawn_blocking(move || {
                            context.execute(blocking_replay, clip_path)
                        })
                        .await
                        .unwrap_or_else(|join_err| {
                            Err(JobError::Aborted {
                                replay,
                                message: join_err.to_string(),
                            })
                        })
                    }
                });
                (replay, handle)
            })
            .collect();

        let total = handles.len();
        let mut clips = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (replay, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|join_err| {
                Err(JobError::Aborted {
                    replay,
                    message: join_err.to_string(),
                })
            });
            match outcome {
                Ok(clip) => clips.push(clip),
                Err(e) => {
                    tracing::error!(replay = %e.replay().display(), error = %e, "Capture job failed");
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            Ok(clips)
        } else {
            Err(SchedulerError::JobsFailed { total, failures })
        }
    }
}
