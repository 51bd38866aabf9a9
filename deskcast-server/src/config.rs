//! Configuration for the broadcaster.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use deskcast_core::{BroadcastConfig, DEFAULT_PORT, ListenerConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Capture and encoding settings.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the viewer listener on.
    pub bind_address: IpAddr,
    /// TCP port viewers connect to.
    pub port: u16,
    /// Maximum simultaneous viewers (0 = unlimited).
    pub max_clients: usize,
    /// Per-viewer send timeout in milliseconds.
    pub send_timeout_ms: u64,
}

/// Capture and encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Target frames per second.
    pub fps: u8,
    /// JPEG quality, 0-100.
    pub quality: u8,
    /// zstd compression level.
    pub compression_level: i32,
    /// Width of the generated test pattern.
    pub width: u32,
    /// Height of the generated test pattern.
    pub height: u32,
    /// Backoff after a failed capture, in milliseconds.
    pub source_retry_ms: u64,
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
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_clients: 0,
            send_timeout_ms: 2000,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            quality: 60,
            compression_level: 1,
            width: 1280,
            height: 720,
            source_retry_ms: 500,
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

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Broadcast loop settings, with fps and quality clamped to range.
    pub fn to_broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            target_fps: self.stream.fps.clamp(1, 60),
            quality: self.stream.quality.min(100),
            compression_level: self.stream.compression_level,
            source_retry: Duration::from_millis(self.stream.source_retry_ms),
        }
    }

    pub fn to_listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind_addr: SocketAddr::new(self.network.bind_address, self.network.port),
            send_timeout: Duration::from_millis(self.network.send_timeout_ms.max(1)),
            max_clients: self.network.max_clients,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
