//! slp-batch
//!
//! Renders sets of Slippi replays into one video per set: replay captures run in a
//! bounded pool, each in its own temporary workspace, and the finished clips are joined
//! in a deterministic order.

pub mod batch;
pub mod capture;
pub mod concat;
pub mod concurrency;
pub mod encode;
pub mod estimate;
pub mod logging;
pub mod metadata;
pub mod replay_set;
pub mod scheduler;
pub mod spec_file;
pub mod startup;
pub mod workspace;

pub use batch::{
    BatchDriver, BatchPreview, BatchReport, SetError, SetFailure, SetPreview, SetSuccess,
};
pub use capture::{Capture, CaptureError, CapturedStreams, DolphinCapture};
pub use concat::{order_clips, ClipOrder, ConcatError, ConcatManifest, Concatenator};
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use encode::{EncodeError, Encoder, FfmpegEncoder};
pub use estimate::{format_duration_ms, SetEstimate};
pub use logging::init_logging;
pub use metadata::{CommandReplayParser, MetadataError, ReplayMetadata, ReplayParser};
pub use replay_set::{sanitize_name, ReplaySet};
pub use scheduler::{CaptureScheduler, JobError, JobState, RenderedClip, SchedulerError};
pub use slp_batch_config as config;
pub use slp_batch_config::Config;
pub use spec_file::{parse_spec, parse_spec_file, SpecError};
pub use startup::{check_encoder_available, run_startup_checks, StartupError};
pub use workspace::TempWorkspace;
