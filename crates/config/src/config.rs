//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix left in the shipped example config for paths the user must fill in
pub const PLACEHOLDER_PREFIX: &str = "SET THIS TO";

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A path was left at its placeholder value
    Placeholder { key: &'static str },
    /// A referenced path does not exist
    MissingPath { key: &'static str, path: PathBuf },
    /// A value is present but not usable
    InvalidValue { key: &'static str, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Placeholder { key } => write!(
                f,
                "Please edit the config file and set a path for: {}",
                key
            ),
            ConfigError::MissingPath { key, path } => write!(
                f,
                "Config path for {} does not exist: {}",
                key,
                path.display()
            ),
            ConfigError::InvalidValue { key, message } => {
                write!(f, "Invalid value for {}: {}", key, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// How many replays may be captured at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawParallelGames", into = "RawParallelGames")]
pub enum ParallelGames {
    /// One capture per physical core
    Recommended,
    /// An explicit number of concurrent captures (always >= 1)
    Fixed(u32),
}

impl Default for ParallelGames {
    fn default() -> Self {
        ParallelGames::Recommended
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawParallelGames {
    Count(i64),
    Keyword(String),
}

impl TryFrom<RawParallelGames> for ParallelGames {
    type Error = String;

    fn try_from(raw: RawParallelGames) -> Result<Self, Self::Error> {
        match raw {
            RawParallelGames::Count(n) if n >= 1 && n <= u32::MAX as i64 => {
                Ok(ParallelGames::Fixed(n as u32))
            }
            RawParallelGames::Count(n) => {
                Err(format!("parallel_games must be at least 1, got {}", n))
            }
            RawParallelGames::Keyword(s) => s.parse(),
        }
    }
}

impl From<ParallelGames> for RawParallelGames {
    fn from(value: ParallelGames) -> Self {
        match value {
            ParallelGames::Recommended => RawParallelGames::Keyword("recommended".to_string()),
            ParallelGames::Fixed(n) => RawParallelGames::Count(n as i64),
        }
    }
}

impl FromStr for ParallelGames {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("recommended") {
            return Ok(ParallelGames::Recommended);
        }
        match s.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(ParallelGames::Fixed(n)),
            _ => Err(format!(
                "parallel_games must be a positive integer or \"recommended\", got {:?}",
                s
            )),
        }
    }
}

/// Output resolution of the captured footage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
            Resolution::P1440 => "1440p",
            Resolution::P2160 => "2160p",
        }
    }

    /// Emulator internal resolution multiplier that yields this output height
    pub fn internal_scale(&self) -> u32 {
        match self {
            Resolution::P480 => 2,
            Resolution::P720 => 3,
            Resolution::P1080 => 5,
            Resolution::P1440 => 6,
            Resolution::P2160 => 8,
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "480p" => Ok(Resolution::P480),
            "720p" => Ok(Resolution::P720),
            "1080p" => Ok(Resolution::P1080),
            "1440p" => Ok(Resolution::P1440),
            "2160p" => Ok(Resolution::P2160),
            other => Err(format!("unknown resolution {:?}", other)),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths to the external tools and the game image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Playback emulator binary
    pub dolphin: PathBuf,
    /// Game disc image
    pub melee_iso: PathBuf,
    /// Encoder binary; a bare name is looked up on PATH
    pub ffmpeg: PathBuf,
    /// Replay metadata tool
    pub replay_parser: PathBuf,
}

/// Video output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoConfig {
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,
    #[serde(default)]
    pub widescreen: bool,
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
}

fn default_resolution() -> Resolution {
    Resolution::P720
}

fn default_bitrate_kbps() -> u32 {
    16000
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            widescreen: false,
            bitrate_kbps: default_bitrate_kbps(),
        }
    }
}

/// Render scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RenderConfig {
    #[serde(default)]
    pub parallel_games: ParallelGames,
    /// Frames captured past the end of every replay
    #[serde(default)]
    pub extra_frames: u32,
    /// Advisory per-replay render time ceiling; never enforced
    #[serde(default)]
    pub render_time_ceiling_secs: Option<u64>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file without validating paths
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - SLP_PARALLEL_GAMES -> render.parallel_games
    /// - SLP_EXTRA_FRAMES -> render.extra_frames
    /// - SLP_BITRATE_KBPS -> video.bitrate_kbps
    /// - SLP_RESOLUTION -> video.resolution
    /// - SLP_WIDESCREEN -> video.widescreen
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SLP_PARALLEL_GAMES") {
            if let Ok(parallel) = val.parse::<ParallelGames>() {
                self.render.parallel_games = parallel;
            }
        }

        if let Ok(val) = env::var("SLP_EXTRA_FRAMES") {
            if let Ok(frames) = val.parse::<u32>() {
                self.render.extra_frames = frames;
            }
        }

        if let Ok(val) = env::var("SLP_BITRATE_KBPS") {
            if let Ok(kbps) = val.parse::<u32>() {
                self.video.bitrate_kbps = kbps;
            }
        }

        if let Ok(val) = env::var("SLP_RESOLUTION") {
            if let Ok(resolution) = val.parse::<Resolution>() {
                self.video.resolution = resolution;
            }
        }

        if let Ok(val) = env::var("SLP_WIDESCREEN") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.video.widescreen = true,
                "false" | "0" | "no" => self.video.widescreen = false,
                _ => {}
            }
        }
    }

    /// Check values and expand, check and resolve every referenced path
    ///
    /// Fails on the first path that is still a placeholder or that does not exist.
    /// A bare encoder name is replaced by its location on PATH.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.video.bitrate_kbps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "bitrate_kbps",
                message: "bitrate must be greater than zero".to_string(),
            });
        }

        self.paths.dolphin = check_path("dolphin", &self.paths.dolphin)?;
        self.paths.melee_iso = check_path("melee_iso", &self.paths.melee_iso)?;
        self.paths.replay_parser = check_path("replay_parser", &self.paths.replay_parser)?;

        check_placeholder("ffmpeg", &self.paths.ffmpeg)?;
        let ffmpeg = expand_tilde(&self.paths.ffmpeg);
        self.paths.ffmpeg = if ffmpeg.components().count() > 1 {
            if !ffmpeg.exists() {
                return Err(ConfigError::MissingPath {
                    key: "ffmpeg",
                    path: ffmpeg,
                });
            }
            ffmpeg
        } else {
            which::which(&ffmpeg).map_err(|_| ConfigError::MissingPath {
                key: "ffmpeg",
                path: ffmpeg,
            })?
        };

        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate paths
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn check_placeholder(key: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.to_string_lossy().starts_with(PLACEHOLDER_PREFIX) {
        return Err(ConfigError::Placeholder { key });
    }
    Ok(())
}

fn check_path(key: &'static str, path: &Path) -> Result<PathBuf, ConfigError> {
    check_placeholder(key, path)?;
    let expanded = expand_tilde(path);
    if !expanded.exists() {
        return Err(ConfigError::MissingPath {
            key,
            path: expanded,
        });
    }
    Ok(expanded)
}

/// Replace a leading `~` with the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
