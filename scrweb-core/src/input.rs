//! Normalized gesture → device pixel mapping.
//!
//! Pure arithmetic. Callers pass the session's last known resolution;
//! an unresolved session maps against [`Resolution::FALLBACK`]. The
//! results go to [`DeviceCommandExecutor`](crate::DeviceCommandExecutor).

use serde::Deserialize;

use crate::device::Resolution;

/// Scroll flicks are fast.
pub const SCROLL_DURATION_MS: u32 = 100;
/// The swipe-up shortcut is slow and deliberate.
pub const SWIPE_UP_DURATION_MS: u32 = 1000;
/// Scroll distance as a fraction of the display height.
const SCROLL_FRACTION: f64 = 0.2;

// ── Types ────────────────────────────────────────────────────────

/// Scroll direction as reported by the viewer's wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// A straight-line swipe in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeGesture {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub duration_ms: u32,
}

impl SwipeGesture {
    fn vertical(x: u32, y_start: u32, y_end: u32, duration_ms: u32) -> Self {
        Self {
            x1: x,
            y1: y_start,
            x2: x,
            y2: y_end,
            duration_ms,
        }
    }
}

// ── Mapping ──────────────────────────────────────────────────────

/// Map a normalized tap to device pixels.
///
/// Returns `None` unless both coordinates lie in `[0, 1]`.
pub fn map_tap(x: f64, y: f64, resolution: Option<Resolution>) -> Option<(u32, u32)> {
    let unit = 0.0..=1.0;
    if !unit.contains(&x) || !unit.contains(&y) {
        return None;
    }
    let res = resolution.unwrap_or(Resolution::FALLBACK);
    Some((
        round(x * f64::from(res.width)),
        round(y * f64::from(res.height)),
    ))
}

/// Vertical flick through the display centre covering 20% of its height.
///
/// `Down` drags content up (the swipe travels upwards); `Up` the reverse.
pub fn map_scroll(direction: ScrollDirection, resolution: Option<Resolution>) -> SwipeGesture {
    let res = resolution.unwrap_or(Resolution::FALLBACK);
    let x = round(f64::from(res.width) / 2.0);
    let center = round(f64::from(res.height) / 2.0);
    let distance = round(f64::from(res.height) * SCROLL_FRACTION);
    let half = round(f64::from(distance) / 2.0);

    let (start, end) = match direction {
        ScrollDirection::Down => (center + half, center.saturating_sub(half)),
        ScrollDirection::Up => (center.saturating_sub(half), center + half),
    };
    SwipeGesture::vertical(x, start, end, SCROLL_DURATION_MS)
}

/// Long upward swipe from 90% to 10% of the height (system shortcut).
pub fn map_swipe_up_shortcut(resolution: Option<Resolution>) -> SwipeGesture {
    let res = resolution.unwrap_or(Resolution::FALLBACK);
    let height = f64::from(res.height);
    SwipeGesture::vertical(
        round(f64::from(res.width) / 2.0),
        round(height * 0.9),
        round(height * 0.1),
        SWIPE_UP_DURATION_MS,
    )
}

fn round(v: f64) -> u32 {
    v.round() as u32
}

// ── Tests ────────────────────────────────────────────────────────
