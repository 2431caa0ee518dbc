//! Stream targets and per-stream options.

use std::fmt;

/// Default capture bitrate in bits per second.
pub const DEFAULT_BITRATE_BPS: u32 = 2_000_000;

// ── TargetId ─────────────────────────────────────────────────────

/// Opaque identifier of a device (or the virtual source) to stream from.
///
/// Always non-empty; construct through [`TargetId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId(String);

impl TargetId {
    /// Accept a raw id, rejecting empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id reduced to characters that are safe inside a file name.
    ///
    /// Network serials such as `192.168.1.20:5555` keep their shape but
    /// lose the separator characters.
    pub fn file_component(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── StreamOptions ────────────────────────────────────────────────

/// Immutable per-stream settings supplied with a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Capture encoder bitrate.
    pub bitrate_bps: u32,
    /// Whether the capture process should record device audio.
    pub audio_enabled: bool,
    /// Longest output side in pixels; `None` leaves it unconstrained.
    pub max_dimension: Option<u32>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            bitrate_bps: DEFAULT_BITRATE_BPS,
            audio_enabled: false,
            max_dimension: None,
        }
    }
}

impl StreamOptions {
    /// A bitrate of 0 selects [`DEFAULT_BITRATE_BPS`].
    pub fn with_bitrate(mut self, bps: u32) -> Self {
        self.bitrate_bps = if bps == 0 { DEFAULT_BITRATE_BPS } else { bps };
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    /// A limit of 0 means unconstrained.
    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = (max > 0).then_some(max);
        self
    }
}
