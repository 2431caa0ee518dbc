//! Configuration for the relay server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scrweb_core::{DeviceConfig, PipelineConfig, Resolution};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings.
    pub network: NetworkConfig,
    /// Device shell and resolution settings.
    pub device: DeviceSection,
    /// External programs and stream plumbing.
    pub pipeline: PipelineSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the HTTP listener on.
    pub bind_address: String,
    /// TCP port for HTTP and WebSocket traffic.
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
}

/// Device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Path to the `adb` executable.
    pub adb_path: PathBuf,
    /// Deadline for the `wm size` query in milliseconds.
    pub resolution_timeout_ms: u64,
    /// Target id served from canned media.
    pub virtual_target: String,
    pub virtual_width: u32,
    pub virtual_height: u32,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// scrcpy client executable.
    pub capture_program: PathBuf,
    /// scrcpy server artifact pushed to the device.
    pub capture_server_path: PathBuf,
    /// ffmpeg executable.
    pub transcode_program: PathBuf,
    /// H.264 file replayed for the virtual target.
    pub virtual_source: PathBuf,
    /// Directory for named-pipe channel files.
    pub channel_dir: PathBuf,
    /// `XDG_RUNTIME_DIR` fallback for the capture client.
    pub runtime_dir: PathBuf,
    /// Upper bound on post-exit output drain in milliseconds.
    pub drain_timeout_ms: u64,
    /// Read size for transcoder output, in bytes.
    pub read_chunk_size: usize,
    /// Events a viewer may fall behind before output reading pauses.
    pub event_queue_depth: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 8558,
            ws_path: "/ws".into(),
        }
    }
}

impl Default for DeviceSection {
    fn default() -> Self {
        let device = DeviceConfig::default();
        Self {
            adb_path: device.adb_path,
            resolution_timeout_ms: device.resolution_timeout.as_millis() as u64,
            virtual_target: device.virtual_target,
            virtual_width: device.virtual_resolution.width,
            virtual_height: device.virtual_resolution.height,
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            capture_program: pipeline.capture_program,
            capture_server_path: pipeline.capture_server_path,
            transcode_program: pipeline.transcode_program,
            virtual_source: pipeline.virtual_source,
            channel_dir: pipeline.channel_dir,
            runtime_dir: pipeline.runtime_dir,
            drain_timeout_ms: pipeline.drain_timeout.as_millis() as u64,
            read_chunk_size: pipeline.read_chunk_size,
            event_queue_depth: pipeline.event_queue_depth,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Core pipeline settings. The adb path is shared with the device section.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let p = &self.pipeline;
        PipelineConfig {
            capture_program: p.capture_program.clone(),
            capture_server_path: p.capture_server_path.clone(),
            adb_path: self.device.adb_path.clone(),
            transcode_program: p.transcode_program.clone(),
            virtual_source: p.virtual_source.clone(),
            channel_dir: p.channel_dir.clone(),
            runtime_dir: p.runtime_dir.clone(),
            drain_timeout: Duration::from_millis(p.drain_timeout_ms),
            read_chunk_size: p.read_chunk_size.max(1),
            event_queue_depth: p.event_queue_depth.max(1),
        }
    }

    pub fn to_device_config(&self) -> DeviceConfig {
        let d = &self.device;
        DeviceConfig {
            adb_path: d.adb_path.clone(),
            resolution_timeout: Duration::from_millis(d.resolution_timeout_ms.max(1)),
            virtual_target: d.virtual_target.clone(),
            virtual_resolution: Resolution::new(d.virtual_width.max(1), d.virtual_height.max(1)),
        }
    }

    /// Normalized WebSocket route, always starting with `/`.
    pub fn ws_path(&self) -> String {
        let path = self.network.ws_path.trim();
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        assert!(text.contains("ws_path"));
        assert!(text.contains("capture_server_path"));
        assert!(text.contains("drain_timeout_ms"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 8558);
        assert_eq!(parsed.device.virtual_target, "test-device");
        assert_eq!(parsed.pipeline.read_chunk_size, 64 * 1024);
        assert_eq!(parsed.pipeline.event_queue_depth, 4);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ServerConfig = toml::from_str(
            r#"
            [network]
            port = 9000

            [device]
            adb_path = "/opt/platform-tools/adb"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network.port, 9000);
        assert_eq!(parsed.network.ws_path, "/ws");
        assert_eq!(parsed.logging.level, "info");

        let pipeline = parsed.to_pipeline_config();
        assert_eq!(pipeline.adb_path, PathBuf::from("/opt/platform-tools/adb"));
        assert_eq!(pipeline.transcode_program, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn conversions_clamp_degenerate_values() {
        let mut cfg = ServerConfig::default();
        cfg.pipeline.read_chunk_size = 0;
        cfg.pipeline.event_queue_depth = 0;
        cfg.device.virtual_width = 0;
        assert_eq!(cfg.to_pipeline_config().read_chunk_size, 1);
        assert_eq!(cfg.to_pipeline_config().event_queue_depth, 1);
        assert_eq!(cfg.to_device_config().virtual_resolution.width, 1);
        assert_eq!(
            cfg.to_device_config().resolution_timeout,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn ws_path_is_normalized() {
        let mut cfg = ServerConfig::default();
        cfg.network.ws_path = "stream".into();
        assert_eq!(cfg.ws_path(), "/stream");
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig::load(&dir.path().join("absent.toml"));
        assert_eq!(cfg.network.port, 8558);
    }

    #[test]
    fn load_reads_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrweb.toml");
        let mut written = ServerConfig::default();
        written.pipeline.event_queue_depth = 32;
        written.logging.level = "debug".into();
        std::fs::write(&path, toml::to_string_pretty(&written).unwrap()).unwrap();

        let cfg = ServerConfig::load(&path);
        assert_eq!(cfg.network.bind_address, "0.0.0.0");
        assert_eq!(cfg.pipeline.drain_timeout_ms, 500);
        assert_eq!(cfg.pipeline.event_queue_depth, 32);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn load_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrweb.toml");
        std::fs::write(&path, "[network]\nport = \"not a port\"\n").unwrap();
        assert_eq!(ServerConfig::load(&path).network.port, 8558);
    }
}
