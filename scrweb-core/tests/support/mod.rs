//! Shared fixtures: stand-in programs and an in-memory device shell.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scrweb_core::{DeviceConfig, DeviceShell, PipelineConfig, ScrwebError, TargetId};
use tempfile::TempDir;

pub const WAIT: Duration = Duration::from_secs(5);

/// Reads the `-i` argument and streams it to stdout.
pub const CAT_INPUT: &str = r#"
in=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-i" ]; then in="$2"; fi
  shift
done
exec cat "$in"
"#;

/// Writes `payload` into the `--record=` channel, lingers, exits 0.
pub fn capture_writing(payload: &str) -> String {
    format!(
        r#"
ch=""
for arg in "$@"; do
  case "$arg" in --record=*) ch="${{arg#--record=}}" ;; esac
done
printf '%s\n' "$*" > "$(dirname "$0")/capture.args"
printf '%s' '{payload}' > "$ch"
sleep 1
"#
    )
}

/// Scratch directory holding stand-in programs and the channel files.
pub struct Rig {
    pub dir: TempDir,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an executable `/bin/sh` script named `name`.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// Pipeline config pointing at `capture` and `transcode` scripts.
    pub fn pipeline_config(&self, capture: &str, transcode: &str) -> PipelineConfig {
        PipelineConfig {
            capture_program: self.script("scrcpy", capture),
            transcode_program: self.script("ffmpeg", transcode),
            virtual_source: self.dir.path().join("test.h264"),
            channel_dir: self.dir.path().to_path_buf(),
            runtime_dir: self.dir.path().to_path_buf(),
            drain_timeout: Duration::from_millis(500),
            ..PipelineConfig::default()
        }
    }

    pub fn channel_files(&self) -> Vec<PathBuf> {
        fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "mkv"))
            .collect()
    }
}

pub fn device_config() -> DeviceConfig {
    DeviceConfig {
        resolution_timeout: Duration::from_millis(500),
        ..DeviceConfig::default()
    }
}

pub fn target(id: &str) -> TargetId {
    TargetId::parse(id).unwrap()
}

/// Answers `wm size` with a fixed display and records every call.
#[derive(Default)]
pub struct FakeShell {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Poll until a call with exactly `args` was recorded.
    pub async fn wait_for_call(&self, args: &[&str]) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if self
                .calls()
                .iter()
                .any(|(_, a)| a.iter().map(String::as_str).eq(args.iter().copied()))
            {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl DeviceShell for FakeShell {
    async fn run(&self, target: &TargetId, args: &[String]) -> Result<String, ScrwebError> {
        self.calls
            .lock()
            .unwrap()
            .push((target.to_string(), args.to_vec()));
        if args.first().is_some_and(|a| a == "wm") {
            Ok("Physical size: 1080x2400\n".into())
        } else {
            Ok(String::new())
        }
    }
}
