//! Domain-specific error types for scrweb.
//!
//! All fallible operations return `Result<T, ScrwebError>`. Errors raised
//! inside a pipeline or a device command are absorbed and translated into
//! lifecycle messages; they never cross the transport as Rust errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The canonical error type for scrweb.
#[derive(Debug, Error)]
pub enum ScrwebError {
    // ── Process / resource errors ────────────────────────────────
    /// An external process could not be launched.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The intermediate channel resource could not be created.
    #[error("failed to create channel {}: {reason}", path.display())]
    ChannelCreate { path: PathBuf, reason: String },

    /// A spawned process did not expose the pipe we asked for.
    #[error("{0} process has no output pipe")]
    MissingPipe(&'static str),

    /// The operation needs an OS facility this platform lacks.
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),

    // ── Device errors ────────────────────────────────────────────
    /// A remote shell command exited unsuccessfully.
    #[error("device command on {target} failed (status {status:?}): {stderr}")]
    DeviceCommand {
        target: String,
        status: Option<i32>,
        stderr: String,
    },

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── State errors ─────────────────────────────────────────────
    /// A pipeline phase transition was attempted from the wrong phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    // ── Protocol errors ──────────────────────────────────────────
    /// An inbound message was malformed or missing required fields.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Encoding of an outbound message failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The I/O layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ScrwebError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            ScrwebError::InvalidCommand(e.to_string())
        } else {
            ScrwebError::Encoding(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = ScrwebError::ChannelCreate {
            path: PathBuf::from("/tmp/scrweb_abc.mkv"),
            reason: "EEXIST".into(),
        };
        assert!(e.to_string().contains("/tmp/scrweb_abc.mkv"));

        let e = ScrwebError::DeviceCommand {
            target: "emulator-5554".into(),
            status: Some(1),
            stderr: "device offline".into(),
        };
        assert!(e.to_string().contains("emulator-5554"));
        assert!(e.to_string().contains("device offline"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: ScrwebError = io_err.into();
        assert!(matches!(e, ScrwebError::Io(_)));
    }

    #[test]
    fn malformed_json_is_invalid_command() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e: ScrwebError = err.into();
        assert!(matches!(e, ScrwebError::InvalidCommand(_)));
    }
}
