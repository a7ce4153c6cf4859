//! Duration, processing time and output size estimates for a set
//!
//! All estimates are pure functions of replay durations and configuration. Only replays
//! whose metadata could be read contribute.

use crate::config::{Config, Resolution};
use crate::metadata::ReplayParser;
use crate::replay_set::ReplaySet;

/// Fixed frame rate of the platform
pub const FRAMES_PER_SECOND: u64 = 60;

/// Measured output sizes, in bytes per millisecond of video, for known settings
const SIZE_CALIBRATION: &[(u32, Resolution, f64)] = &[(16000, Resolution::P720, 1951.26157)];

/// Convert a frame count to whole milliseconds, truncating
pub fn frames_to_ms(frames: u64) -> u64 {
    frames * 1000 / FRAMES_PER_SECOND
}

/// Per-replay durations in frames, each padded by `extra_frames`
pub fn padded_durations_frames(durations: &[u64], extra_frames: u32) -> Vec<u64> {
    durations
        .iter()
        .map(|frames| frames + extra_frames as u64)
        .collect()
}

/// Wall-clock estimate for running `durations_ms` with `parallel` jobs at a time
///
/// Replays are taken in order in chunks of `parallel`; each chunk costs its longest
/// member and chunks run back to back.
pub fn approx_processing_time_ms(durations_ms: &[u64], parallel: u32) -> u64 {
    let chunk = parallel.max(1) as usize;
    durations_ms
        .chunks(chunk)
        .map(|c| c.iter().copied().max().unwrap_or(0))
        .sum()
}

/// Approximate encoded size, if the bitrate and resolution match a calibration point
pub fn approx_output_bytes(
    duration_ms: u64,
    bitrate_kbps: u32,
    resolution: Resolution,
) -> Option<u64> {
    SIZE_CALIBRATION
        .iter()
        .find(|(kbps, res, _)| *kbps == bitrate_kbps && *res == resolution)
        .map(|(_, _, bytes_per_ms)| (bytes_per_ms * duration_ms as f64) as u64)
}

/// Preview numbers for one set
#[derive(Debug, Clone, PartialEq)]
pub struct SetEstimate {
    /// Replays listed in the set
    pub replay_count: usize,
    /// Replays whose metadata could be read
    pub parsed_count: usize,
    /// Padded duration of every parsed replay, in milliseconds
    pub durations_ms: Vec<u64>,
    pub total_duration_ms: u64,
    pub processing_time_ms: u64,
    /// `None` when no calibration point matches the configuration
    pub approx_size_bytes: Option<u64>,
}

impl SetEstimate {
    /// Estimate from raw replay durations
    pub fn from_durations(
        replay_count: usize,
        durations_frames: &[u64],
        config: &Config,
        parallel: u32,
    ) -> Self {
        let durations_ms: Vec<u64> =
            padded_durations_frames(durations_frames, config.render.extra_frames)
                .into_iter()
                .map(frames_to_ms)
                .collect();
        let total_duration_ms = durations_ms.iter().sum();

        Self {
            replay_count,
            parsed_count: durations_frames.len(),
            processing_time_ms: approx_processing_time_ms(&durations_ms, parallel),
            approx_size_bytes: approx_output_bytes(
                total_duration_ms,
                config.video.bitrate_kbps,
                config.video.resolution,
            ),
            durations_ms,
            total_duration_ms,
        }
    }

    /// Estimate a set, reading its metadata through `parser` if not read yet
    pub fn for_set(
        set: &ReplaySet,
        parser: &dyn ReplayParser,
        config: &Config,
        parallel: u32,
    ) -> Self {
        let durations: Vec<u64> = set
            .metadata(parser)
            .iter()
            .map(|parsed| parsed.metadata.duration_frames)
            .collect();
        Self::from_durations(set.len(), &durations, config, parallel)
    }

    /// Replays that were left out because their metadata could not be read
    pub fn skipped_count(&self) -> usize {
        self.replay_count - self.parsed_count
    }
}

/// Format milliseconds as `H:MM:SS`
pub fn format_duration_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!(
        "{}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}
