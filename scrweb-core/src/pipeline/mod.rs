//! # Pipeline: supervised capture/transcode process chains
//!
//! ```text
//! REAL TARGET
//! ┌──────────────┐  named pipe   ┌────────────────┐  stdout   ┌────────────┐
//! │ capture      │ ────────────► │ transcode      │ ────────► │ Session    │
//! │ (diagnostics │  (channel     │ (Annex-B H.264)│  chunks   │ events     │
//! │  → log only) │   resource)   └────────────────┘           └────────────┘
//! └──────────────┘
//!
//! VIRTUAL TARGET
//! ┌──────────────┐  stdout   ┌────────────┐
//! │ source       │ ────────► │ Session    │
//! └──────────────┘  chunks   └────────────┘
//! ```
//!
//! | Module       | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `phase`      | `PipelinePhase` state machine and exit policy     |
//! | `channel`    | Session-unique named pipe, removed on drop        |
//! | `command`    | Process launch specifications                     |
//! | `supervisor` | The task that runs and tears down one pipeline    |

pub mod channel;
pub mod command;
pub mod phase;
mod supervisor;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

pub use channel::ChannelResource;
pub use phase::{ExitAction, PipelinePhase, ProcessRole, on_process_exit};

use crate::device::{Resolution, ResolutionResolver};
use crate::target::{StreamOptions, TargetId};

// ── Identity ─────────────────────────────────────────────────────

/// Process-wide unique, monotonically increasing pipeline id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u64);

impl PipelineId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe-{}", self.0)
    }
}

// ── PipelineConfig ───────────────────────────────────────────────

/// Where the external programs live and how output is read.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Screen capture client.
    pub capture_program: PathBuf,
    /// Device-side server artifact the capture client pushes.
    pub capture_server_path: PathBuf,
    /// `adb` location handed to the capture client.
    pub adb_path: PathBuf,
    /// Transcoder; also replays the virtual source.
    pub transcode_program: PathBuf,
    /// Canned H.264 media for the virtual target.
    pub virtual_source: PathBuf,
    /// Directory holding channel resources.
    pub channel_dir: PathBuf,
    /// `XDG_RUNTIME_DIR` for the capture client when unset.
    pub runtime_dir: PathBuf,
    /// Upper bound on draining output after a process exits.
    pub drain_timeout: Duration,
    /// Read buffer size for the terminal process's stdout.
    pub read_chunk_size: usize,
    /// Capacity of a session's event queue. Output reading pauses while
    /// it is full.
    pub event_queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_program: PathBuf::from("scrcpy"),
            capture_server_path: PathBuf::from("scrcpy-server"),
            adb_path: PathBuf::from("adb"),
            transcode_program: PathBuf::from("ffmpeg"),
            virtual_source: PathBuf::from("test.h264"),
            channel_dir: std::env::temp_dir(),
            runtime_dir: PathBuf::from("/tmp"),
            drain_timeout: Duration::from_millis(500),
            read_chunk_size: 64 * 1024,
            event_queue_depth: 4,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Lifecycle and output events emitted by a pipeline, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The target's display size was resolved.
    Resolved(Resolution),
    /// First output chunk observed.
    Streaming,
    /// One chunk of the terminal process's output.
    Chunk(Bytes),
    /// Ended. `exit_code` is that of the process whose exit ended it.
    Stopped { exit_code: Option<i32>, failed: bool },
    /// A process or the channel resource could not be created.
    SpawnFailed { message: String },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::SpawnFailed { .. })
    }
}

/// A [`PipelineEvent`] tagged with its source pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub pipeline: PipelineId,
    pub event: PipelineEvent,
}

/// How a pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// `Stopped` or `Failed`.
    pub phase: PipelinePhase,
    pub exit_code: Option<i32>,
}

// ── Pipeline ─────────────────────────────────────────────────────

/// Handle to one running stream attempt.
///
/// Dropping the handle cancels the pipeline; [`stop`](Self::stop) also
/// waits for teardown to complete.
pub struct Pipeline {
    id: PipelineId,
    target: TargetId,
    options: StreamOptions,
    channel_path: Option<PathBuf>,
    phase: watch::Receiver<PipelinePhase>,
    cancel: CancellationToken,
    task: JoinHandle<PipelineOutcome>,
    _guard: DropGuard,
}

impl Pipeline {
    /// Start a pipeline for `target`.
    ///
    /// Returns at once in `Created`. Resolution, channel creation and
    /// process launch happen on the pipeline's own task; a spawn failure
    /// arrives as [`PipelineEvent::SpawnFailed`] on `events`.
    pub fn spawn(
        id: PipelineId,
        target: TargetId,
        options: StreamOptions,
        config: Arc<PipelineConfig>,
        resolver: ResolutionResolver,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let is_virtual = resolver.is_virtual(&target);
        let channel_path =
            (!is_virtual).then(|| ChannelResource::path_for(&config.channel_dir, &target, id));
        let (phase_tx, phase_rx) = watch::channel(PipelinePhase::Created);
        let cancel = CancellationToken::new();

        info!(pipeline = %id, target = %target, ?options, "starting pipeline");

        let supervisor = supervisor::Supervisor {
            id,
            target: target.clone(),
            options,
            config,
            resolver,
            channel_path: channel_path.clone(),
            events,
            phase: phase_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run());

        Self {
            id,
            target,
            options,
            channel_path,
            phase: phase_rx,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Filesystem path of the channel resource (real targets only).
    pub fn channel_path(&self) -> Option<&std::path::Path> {
        self.channel_path.as_deref()
    }

    /// Snapshot of the current phase.
    pub fn phase(&self) -> PipelinePhase {
        self.phase.borrow().clone()
    }

    /// A receiver that observes every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<PipelinePhase> {
        self.phase.clone()
    }

    /// Signal the processes, remove the channel resource and wait for the
    /// supervisor to finish. Process exit itself is not awaited.
    pub async fn stop(self) -> PipelineOutcome {
        self.cancel.cancel();
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(pipeline = %self.id, "supervisor task ended abnormally: {e}");
                PipelineOutcome {
                    phase: PipelinePhase::Failed,
                    exit_code: None,
                }
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}
