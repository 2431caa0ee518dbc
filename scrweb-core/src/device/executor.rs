//! Fire-and-forget input commands against a target.
//!
//! Each call spawns its shell invocation and returns immediately. A
//! failure is logged and dropped; nothing is retried and nothing reaches
//! the client. A lost tap is acceptable on a best-effort control surface.

use std::sync::Arc;

use tracing::{debug, warn};

use super::DeviceShell;
use crate::input::SwipeGesture;
use crate::target::TargetId;

/// `KEYCODE_WAKEUP`: turns the screen on without toggling it off.
pub const KEYCODE_WAKEUP: u32 = 224;

// ── Keycode ──────────────────────────────────────────────────────

/// A key event code, numeric or symbolic (`KEYCODE_HOME`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keycode {
    Code(u32),
    Named(String),
}

impl Keycode {
    /// Accept a symbolic keycode made only of `[A-Za-z0-9_]`.
    ///
    /// All-digit names collapse to [`Keycode::Code`].
    pub fn named(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        match name.parse::<u32>() {
            Ok(code) => Some(Self::Code(code)),
            Err(_) => Some(Self::Named(name.to_string())),
        }
    }

    fn as_arg(&self) -> String {
        match self {
            Self::Code(code) => code.to_string(),
            Self::Named(name) => name.clone(),
        }
    }
}

// ── DeviceCommandExecutor ────────────────────────────────────────

/// Issues wake / key / tap / swipe commands without awaiting them.
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct DeviceCommandExecutor {
    shell: Arc<dyn DeviceShell>,
}

impl DeviceCommandExecutor {
    pub fn new(shell: Arc<dyn DeviceShell>) -> Self {
        Self { shell }
    }

    /// Wake the target's display.
    pub fn wake(&self, target: &TargetId) {
        self.send_key(target, &Keycode::Code(KEYCODE_WAKEUP));
    }

    pub fn send_key(&self, target: &TargetId, keycode: &Keycode) {
        self.dispatch(target, "keyevent", vec![
            "input".into(),
            "keyevent".into(),
            keycode.as_arg(),
        ]);
    }

    pub fn tap(&self, target: &TargetId, (x, y): (u32, u32)) {
        self.dispatch(target, "tap", vec![
            "input".into(),
            "tap".into(),
            x.to_string(),
            y.to_string(),
        ]);
    }

    pub fn swipe(&self, target: &TargetId, gesture: SwipeGesture) {
        self.dispatch(target, "swipe", vec![
            "input".into(),
            "swipe".into(),
            gesture.x1.to_string(),
            gesture.y1.to_string(),
            gesture.x2.to_string(),
            gesture.y2.to_string(),
            gesture.duration_ms.to_string(),
        ]);
    }

    fn dispatch(&self, target: &TargetId, what: &'static str, args: Vec<String>) {
        debug!(target = %target, ?args, "sending {what}");
        let shell = Arc::clone(&self.shell);
        let target = target.clone();
        tokio::spawn(async move {
            if let Err(e) = shell.run(&target, &args).await {
                warn!(target = %target, "{what} failed: {e}");
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────
