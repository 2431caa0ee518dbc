//! Intermediate channel resource: the named pipe joining capture to
//! transcode.
//!
//! Names combine the target, this process id and the pipeline id, so
//! concurrent pipelines never share a path and a lingering file from an
//! earlier pipeline cannot collide with a new one. The file is removed
//! when the [`ChannelResource`] is dropped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::PipelineId;
use crate::error::ScrwebError;
use crate::target::TargetId;

/// An owned named pipe on the filesystem.
#[derive(Debug)]
pub struct ChannelResource {
    path: PathBuf,
}

impl ChannelResource {
    /// The session-unique path for a pipeline's channel under `dir`.
    pub fn path_for(dir: &Path, target: &TargetId, pipeline: PipelineId) -> PathBuf {
        dir.join(format!(
            "scrweb_{}_{}_{}.mkv",
            target.file_component(),
            std::process::id(),
            pipeline.get()
        ))
    }

    /// Create the named pipe at `path`, replacing any stale file there.
    pub fn create(path: PathBuf) -> Result<Self, ScrwebError> {
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("removed stale channel {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ScrwebError::ChannelCreate {
                    path,
                    reason: format!("stale file could not be removed: {e}"),
                });
            }
        }

        make_fifo(&path)?;
        debug!("created channel {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ChannelResource {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed channel {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            // A unique name means a leftover file blocks nothing.
            Err(e) => warn!("failed to remove channel {}: {e}", self.path.display()),
        }
    }
}

#[cfg(unix)]
fn make_fifo(path: &Path) -> Result<(), ScrwebError> {
    use nix::sys::stat::Mode;

    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| {
        ScrwebError::ChannelCreate {
            path: path.to_path_buf(),
            reason: errno.to_string(),
        }
    })
}

#[cfg(not(unix))]
fn make_fifo(_path: &Path) -> Result<(), ScrwebError> {
    Err(ScrwebError::Unsupported("named pipes"))
}

// ── Tests ────────────────────────────────────────────────────────
