//! Physical display size queries.
//!
//! The resolver runs `wm size` on the target and parses the `WxH` it
//! reports. Any failure degrades to "unresolved"; callers fall back to
//! [`Resolution::FALLBACK`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DeviceConfig, DeviceShell};
use crate::error::ScrwebError;
use crate::target::TargetId;

// ── Resolution ───────────────────────────────────────────────────

/// A display size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Dimensions assumed while a target's resolution is unknown.
    pub const FALLBACK: Resolution = Resolution::new(1080, 1920);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse the output of `wm size`.
    ///
    /// Prefers the `Physical size:` line (an `Override size:` line may
    /// follow it); otherwise takes the first `WxH` token anywhere.
    pub fn parse_wm_size(text: &str) -> Option<Self> {
        let physical = text.lines().find_map(|line| {
            line.trim()
                .strip_prefix("Physical size:")
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(Self::parse_token)
        });

        physical.or_else(|| text.split_whitespace().find_map(Self::parse_token))
    }

    /// Parse a single `1080x2400` token. Zero dimensions are rejected.
    fn parse_token(token: &str) -> Option<Self> {
        let (w, h) = token.split_once('x')?;
        let width: u32 = w.parse().ok()?;
        let height: u32 = h.parse().ok()?;
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── ResolutionResolver ───────────────────────────────────────────

/// Queries a target's physical display size on demand.
#[derive(Clone)]
pub struct ResolutionResolver {
    shell: Arc<dyn DeviceShell>,
    timeout: Duration,
    virtual_target: String,
    virtual_resolution: Resolution,
}

impl ResolutionResolver {
    pub fn new(shell: Arc<dyn DeviceShell>, config: &DeviceConfig) -> Self {
        Self {
            shell,
            timeout: config.resolution_timeout,
            virtual_target: config.virtual_target.clone(),
            virtual_resolution: config.virtual_resolution,
        }
    }

    /// Whether `target` is the canned-media virtual source.
    pub fn is_virtual(&self, target: &TargetId) -> bool {
        target.as_str() == self.virtual_target
    }

    /// Resolve the display size of `target`.
    ///
    /// The virtual target answers with its fixed constant and never
    /// touches the shell. `None` means unresolved.
    pub async fn resolve(&self, target: &TargetId) -> Option<Resolution> {
        if self.is_virtual(target) {
            return Some(self.virtual_resolution);
        }

        let args = ["wm".to_string(), "size".to_string()];
        let result = match tokio::time::timeout(self.timeout, self.shell.run(target, &args)).await
        {
            Ok(result) => result,
            Err(_) => Err(ScrwebError::Timeout(self.timeout)),
        };

        match result {
            Ok(text) => {
                let parsed = Resolution::parse_wm_size(&text);
                if parsed.is_none() {
                    debug!(target = %target, "no WxH in wm size output: {:?}", text.trim());
                }
                parsed
            }
            Err(e) => {
                debug!(target = %target, "resolution query failed: {e}");
                None
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
