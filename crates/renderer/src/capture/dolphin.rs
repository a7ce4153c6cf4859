//! Playback emulator capture
//!
//! Runs the emulator in batch mode with frame and audio dumping switched on. Every
//! capture gets its own user directory inside the job workspace, so concurrent
//! emulators never share settings or dump files.

use super::{Capture, CaptureError, CapturedStreams};
use crate::config::{Config, Resolution};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use uuid::Uuid;

/// Line prefix the emulator prints once per rendered frame
const FRAME_MARKER: &str = "[CURRENT_FRAME]";

/// Playback instructions read by the emulator at startup
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackFile<'a> {
    mode: &'static str,
    replay: &'a Path,
    is_real_time_mode: bool,
    command_id: String,
}

/// Capture backed by the playback emulator
#[derive(Debug, Clone)]
pub struct DolphinCapture {
    dolphin: PathBuf,
    iso: PathBuf,
    resolution: Resolution,
    widescreen: bool,
}

impl DolphinCapture {
    pub fn new(dolphin: PathBuf, iso: PathBuf, resolution: Resolution, widescreen: bool) -> Self {
        Self {
            dolphin,
            iso,
            resolution,
            widescreen,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.dolphin.clone(),
            config.paths.melee_iso.clone(),
            config.video.resolution,
            config.video.widescreen,
        )
    }
}

/// Dumped video stream inside a user directory
pub fn frame_dump_path(user_dir: &Path) -> PathBuf {
    user_dir.join("Dump").join("Frames").join("framedump0.avi")
}

/// Dumped audio stream inside a user directory
pub fn audio_dump_path(user_dir: &Path) -> PathBuf {
    user_dir.join("Dump").join("Audio").join("dspdump.wav")
}

/// Write emulator settings that enable dumping at the requested resolution
pub fn write_user_dir(user_dir: &Path, resolution: Resolution, widescreen: bool) -> io::Result<()> {
    let config_dir = user_dir.join("Config");
    fs::create_dir_all(&config_dir)?;

    fs::write(
        config_dir.join("Dolphin.ini"),
        "[Movie]\nDumpFrames = True\nDumpFramesSilent = True\n\
         [DSP]\nDumpAudio = True\nDumpAudioSilent = True\n\
         [Display]\nRenderToMain = True\n",
    )?;

    fs::write(
        config_dir.join("GFX.ini"),
        format!(
            "[Settings]\nEFBScale = {}\nInternalResolutionFrameDumps = True\n\
             AspectRatio = {}\nwideScreenHack = {}\n",
            resolution.internal_scale(),
            if widescreen { 1 } else { 0 },
            if widescreen { "True" } else { "False" },
        ),
    )?;

    Ok(())
}

/// Write the playback instructions for `replay` to `path`
pub fn write_playback_file(path: &Path, replay: &Path) -> Result<(), CaptureError> {
    let playback = PlaybackFile {
        mode: "normal",
        replay,
        is_real_time_mode: false,
        command_id: Uuid::new_v4().to_string(),
    };
    fs::write(path, serde_json::to_vec_pretty(&playback)?)?;
    Ok(())
}

/// Build the emulator invocation
///
/// Batch mode, console output on, playback instructions from `playback_file`, settings
/// and dumps under `user_dir`.
pub fn build_dolphin_command(
    dolphin: &Path,
    iso: &Path,
    playback_file: &Path,
    user_dir: &Path,
) -> Command {
    let mut cmd = Command::new(dolphin);
    cmd.arg("-i").arg(playback_file);
    cmd.arg("-u").arg(user_dir);
    cmd.arg("-b");
    cmd.arg("-e").arg(iso);
    cmd.arg("--cout");
    cmd
}

/// Whether a console line reports a rendered frame
pub fn is_frame_line(line: &str) -> bool {
    line.trim_start().starts_with(FRAME_MARKER)
}

/// Count frame lines on `reader` until `target` is reached or the stream ends
///
/// Lines are counted rather than parsed: frame numbers start negative during the
/// pre-game countdown. Output that is not valid UTF-8 is tolerated.
pub fn count_frames<R: BufRead>(mut reader: R, target: u64) -> io::Result<u64> {
    let mut rendered = 0u64;
    let mut line = Vec::new();
    while rendered < target {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if is_frame_line(&String::from_utf8_lossy(&line)) {
            rendered += 1;
        }
    }
    Ok(rendered)
}

/// Running emulator; killed and reaped when dropped
struct EmulatorProcess {
    child: Child,
}

impl EmulatorProcess {
    /// Wait for the emulator to exit on its own
    fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }

    /// Stop the emulator; it keeps running after playback ends
    fn stop(&mut self) -> io::Result<()> {
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "Emulator already exited");
        }
        self.child.wait().map(|_| ())
    }
}

impl Drop for EmulatorProcess {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Failed to reap emulator");
        }
    }
}

impl Capture for DolphinCapture {
    fn capture(
        &self,
        replay: &Path,
        frames: u64,
        workdir: &Path,
    ) -> Result<CapturedStreams, CaptureError> {
        let user_dir = workdir.join("User");
        write_user_dir(&user_dir, self.resolution, self.widescreen)?;

        let playback_file = workdir.join("playback.json");
        write_playback_file(&playback_file, replay)?;

        let child = build_dolphin_command(&self.dolphin, &self.iso, &playback_file, &user_dir)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let mut emulator = EmulatorProcess { child };

        let rendered = match emulator.child.stdout.take() {
            Some(stdout) => count_frames(BufReader::new(stdout), frames)?,
            None => 0,
        };

        if rendered >= frames {
            emulator.stop()?;
        } else {
            let status = emulator.wait()?;
            if !status.success() {
                return Err(match status.code() {
                    Some(code) => CaptureError::Failed(code),
                    None => CaptureError::Terminated,
                });
            }
            return Err(CaptureError::Incomplete {
                reached: rendered,
                target: frames,
            });
        }

        let streams = CapturedStreams {
            video: frame_dump_path(&user_dir),
            audio: audio_dump_path(&user_dir),
        };
        for path in [&streams.video, &streams.audio] {
            if !path.exists() {
                return Err(CaptureError::MissingOutput(path.clone()));
            }
        }

        Ok(streams)
    }
}
