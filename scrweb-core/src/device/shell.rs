//! Remote shell seam.
//!
//! Every device interaction goes through [`DeviceShell`] with its
//! arguments as a structured list. Callers only ever pass fixed words and
//! validated tokens (integers, `[A-Za-z0-9_]` keycodes), which matters
//! because `adb shell` re-joins its arguments on the device side.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::error::ScrwebError;
use crate::target::TargetId;

/// Runs a command in a target's remote shell.
#[async_trait]
pub trait DeviceShell: Send + Sync {
    /// Run `args` on `target` and return its standard output.
    async fn run(&self, target: &TargetId, args: &[String]) -> Result<String, ScrwebError>;
}

// ── AdbShell ─────────────────────────────────────────────────────

/// [`DeviceShell`] backed by `adb -s <serial> shell ...`.
#[derive(Debug, Clone)]
pub struct AdbShell {
    adb_path: PathBuf,
}

impl AdbShell {
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }
}

#[async_trait]
impl DeviceShell for AdbShell {
    async fn run(&self, target: &TargetId, args: &[String]) -> Result<String, ScrwebError> {
        trace!(target = %target, ?args, "adb shell");
        let output = Command::new(&self.adb_path)
            .arg("-s")
            .arg(target.as_str())
            .arg("shell")
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ScrwebError::Spawn {
                program: self.adb_path.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ScrwebError::DeviceCommand {
                target: target.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_adb_binary_is_a_spawn_error() {
        let shell = AdbShell::new("/nonexistent/scrweb-test-adb");
        let target = TargetId::parse("serial").unwrap();
        let err = shell.run(&target, &["wm".into(), "size".into()]).await.unwrap_err();
        assert!(matches!(err, ScrwebError::Spawn { .. }));
    }
}
