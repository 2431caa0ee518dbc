//! Pipeline lifecycle state machine.
//!
//! Transitions are validated and return `Result` instead of panicking.
//! Process exits arrive as discrete events and are classified by
//! [`on_process_exit`], so the teardown policy is testable without
//! running any process.

use std::fmt;
use std::time::Instant;

use crate::error::ScrwebError;

// ── PipelinePhase ────────────────────────────────────────────────

/// The current phase of one pipeline.
///
/// ```text
///  Created ──► Spawning ──► Streaming
///     │            │            │
///     ▼            ▼            ▼
///     └──────► Stopping ◄───────┘
///                  │
///          ┌───────┴───────┐
///          ▼               ▼
///       Stopped          Failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelinePhase {
    /// Handle exists; resolution query may be in flight.
    #[default]
    Created,

    /// Channel resource created and processes launched; no output yet.
    Spawning,

    /// At least one output chunk has been observed.
    Streaming {
        /// When the first chunk arrived.
        since: Instant,
    },

    /// Teardown in progress.
    Stopping,

    /// Ended normally or on request.
    Stopped,

    /// Ended by a spawn failure or an unexpected process exit.
    Failed,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Spawning => write!(f, "Spawning"),
            Self::Streaming { .. } => write!(f, "Streaming"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl PipelinePhase {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// `Stopped` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Created`.
    pub fn begin_spawn(&mut self) -> Result<(), ScrwebError> {
        match self {
            Self::Created => {
                *self = Self::Spawning;
                Ok(())
            }
            _ => Err(ScrwebError::InvalidTransition(
                "cannot spawn: not in Created phase",
            )),
        }
    }

    /// Valid from: `Spawning`.
    pub fn mark_streaming(&mut self) -> Result<(), ScrwebError> {
        match self {
            Self::Spawning => {
                *self = Self::Streaming {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(ScrwebError::InvalidTransition(
                "cannot stream: not in Spawning phase",
            )),
        }
    }

    /// Valid from: `Created`, `Spawning`, `Streaming`.
    pub fn begin_stop(&mut self) -> Result<(), ScrwebError> {
        match self {
            Self::Created | Self::Spawning | Self::Streaming { .. } => {
                *self = Self::Stopping;
                Ok(())
            }
            _ => Err(ScrwebError::InvalidTransition(
                "cannot stop: pipeline already stopping or ended",
            )),
        }
    }

    /// Valid from: `Stopping`.
    pub fn finish(&mut self, failed: bool) -> Result<(), ScrwebError> {
        match self {
            Self::Stopping => {
                *self = if failed { Self::Failed } else { Self::Stopped };
                Ok(())
            }
            _ => Err(ScrwebError::InvalidTransition(
                "cannot finish: not in Stopping phase",
            )),
        }
    }
}

// ── Process exit policy ──────────────────────────────────────────

/// Which process in the chain an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    /// Screen capture/encode, writing into the channel resource.
    Capture,
    /// Reads the channel and writes the client-compatible stream.
    Transcode,
    /// The single process of the virtual topology.
    Source,
}

impl ProcessRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Transcode => "transcode",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the supervisor does in response to an exit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Keep supervising the remaining process.
    Continue,
    /// Tear the whole chain down, ending in `Failed` when `failed`.
    TearDown { failed: bool },
}

/// Classify an exit. `code` is `None` when the process died by signal.
///
/// - capture exiting always tears the chain down;
/// - transcode exiting cleanly leaves capture to decide, anything else tears down;
/// - the virtual source exiting always ends the stream.
pub fn on_process_exit(role: ProcessRole, code: Option<i32>) -> ExitAction {
    let clean = code == Some(0);
    match role {
        ProcessRole::Capture | ProcessRole::Source => ExitAction::TearDown { failed: !clean },
        ProcessRole::Transcode if clean => ExitAction::Continue,
        ProcessRole::Transcode => ExitAction::TearDown { failed: true },
    }
}

// ── Tests ────────────────────────────────────────────────────────
