//! # scrweb-core
//!
//! Per-connection stream session lifecycle for relaying a device screen
//! to a remote viewer and forwarding synthetic input back to it.
//!
//! This crate contains:
//! - **Targets**: `TargetId`, `StreamOptions`
//! - **Device**: `DeviceShell` seam, `ResolutionResolver`, `DeviceCommandExecutor`
//! - **Input**: normalized gesture → device pixel mapping
//! - **Pipeline**: capture/transcode process supervision with an explicit
//!   `PipelinePhase` state machine
//! - **Session**: `SessionRegistry` and the per-connection `Session`
//! - **Protocol**: inbound `ClientMessage` / outbound `ServerMessage`
//! - **Error**: typed `thiserror`-based `ScrwebError`

pub mod device;
pub mod error;
pub mod input;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod target;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use device::{
    AdbShell, DeviceCommandExecutor, DeviceConfig, DeviceShell, Keycode, Resolution,
    ResolutionResolver,
};
pub use error::ScrwebError;
pub use input::{ScrollDirection, SwipeGesture};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineEvent, PipelineId, PipelineOutcome, PipelinePhase,
    ProcessRole, SessionEvent,
};
pub use protocol::{ClientMessage, Frame, ServerMessage};
pub use session::{ConnectionId, Session, SessionRegistry};
pub use target::{StreamOptions, TargetId};
