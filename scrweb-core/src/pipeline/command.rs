//! Launch specifications for the capture, transcode and virtual source
//! processes.
//!
//! Arguments are built as lists and handed to the OS as-is; nothing is
//! ever joined into a shell string.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use super::PipelineConfig;
use crate::target::{StreamOptions, TargetId};

/// A program, its argument list and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Build the command: stdin closed, stdout and stderr piped, killed if
    /// the handle is dropped with the process still alive.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

// ── Builders ─────────────────────────────────────────────────────

/// Screen capture into `channel` as Matroska.
///
/// The capture server artifact and adb location travel as environment,
/// never as compiled-in paths.
pub fn capture_spec(
    config: &PipelineConfig,
    target: &TargetId,
    options: &StreamOptions,
    channel: &Path,
) -> ProcessSpec {
    let mut record = OsString::from("--record=");
    record.push(channel.as_os_str());

    let mut spec = ProcessSpec::new(&config.capture_program)
        .arg("-s")
        .arg(target.as_str());
    if !options.audio_enabled {
        spec = spec.arg("--no-audio");
    }
    spec = spec
        .arg("--no-window")
        .arg(record)
        .arg("--record-format=mkv")
        .arg("--video-bit-rate")
        .arg(options.bitrate_bps.to_string())
        // Baseline profile for browser decoders.
        .arg("--video-codec-options=profile=1");
    if let Some(max) = options.max_dimension {
        spec = spec.arg("--max-size").arg(max.to_string());
    }

    let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
        .unwrap_or_else(|| config.runtime_dir.clone().into_os_string());

    spec.env("SCRCPY_SERVER_PATH", config.capture_server_path.as_os_str())
        .env("ADB", config.adb_path.as_os_str())
        .env("XDG_RUNTIME_DIR", runtime_dir)
}

/// Remux the channel's H.264 into an Annex-B elementary stream on stdout.
pub fn transcode_spec(config: &PipelineConfig, channel: &Path) -> ProcessSpec {
    ProcessSpec::new(&config.transcode_program)
        .arg("-i")
        .arg(channel.as_os_str())
        .arg("-c:v")
        .arg("copy")
        .arg("-bsf:v")
        .arg("h264_mp4toannexb")
        .arg("-an")
        .arg("-f")
        .arg("h264")
        .arg("-")
}

/// Replay the canned source at native rate, already in client format.
pub fn virtual_source_spec(config: &PipelineConfig) -> ProcessSpec {
    ProcessSpec::new(&config.transcode_program)
        .arg("-re")
        .arg("-i")
        .arg(config.virtual_source.as_os_str())
        .arg("-c")
        .arg("copy")
        .arg("-f")
        .arg("h264")
        .arg("-")
}

// ── Tests ────────────────────────────────────────────────────────
