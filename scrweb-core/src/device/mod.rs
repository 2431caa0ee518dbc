//! Device-side collaborators: the remote shell seam, display resolution
//! queries, and fire-and-forget input commands.
//!
//! | Module       | Purpose                                             |
//! |--------------|-----------------------------------------------------|
//! | `shell`      | `DeviceShell` trait and the `adb`-backed `AdbShell` |
//! | `resolution` | `Resolution` parsing and `ResolutionResolver`       |
//! | `executor`   | `DeviceCommandExecutor` (wake, key, tap, swipe)      |

pub mod executor;
pub mod resolution;
pub mod shell;

use std::path::PathBuf;
use std::time::Duration;

pub use executor::{DeviceCommandExecutor, KEYCODE_WAKEUP, Keycode};
pub use resolution::{Resolution, ResolutionResolver};
pub use shell::{AdbShell, DeviceShell};

/// Id of the built-in virtual target unless configured otherwise.
pub const DEFAULT_VIRTUAL_TARGET: &str = "test-device";

/// Configuration for the device collaborators.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Location of the `adb` executable.
    pub adb_path: PathBuf,
    /// Deadline for a resolution query.
    pub resolution_timeout: Duration,
    /// Id of the canned-media target that needs no device.
    pub virtual_target: String,
    /// Fixed resolution reported for the virtual target.
    pub virtual_resolution: Resolution,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            resolution_timeout: Duration::from_secs(3),
            virtual_target: DEFAULT_VIRTUAL_TARGET.into(),
            virtual_resolution: Resolution::new(1280, 720),
        }
    }
}
