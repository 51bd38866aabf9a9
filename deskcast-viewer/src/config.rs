//! Viewer configuration.

use std::path::Path;
use std::time::Duration;

use deskcast_core::{DEFAULT_PORT, SessionConfig, Viewport};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Display settings.
    pub display: DisplayConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Broadcaster host name or IP address.
    pub host: String,
    /// Broadcaster port.
    pub port: u16,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Longest wait for the next frame before giving up, in milliseconds.
    pub read_timeout_ms: u64,
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Viewport width frames are fitted into.
    pub width: u32,
    /// Viewport height frames are fitted into.
    pub height: u32,
    /// Seconds between stats log lines (0 = off).
    pub stats_interval_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 5000,
            read_timeout_ms: 10_000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let viewport = Viewport::default();
        Self {
            width: viewport.width,
            height: viewport.height,
            stats_interval_secs: 5,
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

impl ViewerConfig {
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

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            read_timeout: Duration::from_millis(self.network.read_timeout_ms.max(1)),
            viewport: Viewport::new(self.display.width, self.display.height),
        }
    }

    /// How often to log receive statistics, if at all.
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.display.stats_interval_secs > 0)
            .then(|| Duration::from_secs(self.display.stats_interval_secs))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ViewerConfig::default()).unwrap();
        let parsed: ViewerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, DEFAULT_PORT);
        assert_eq!(parsed.display.width, 1200);
        assert_eq!(parsed.display.height, 700);
    }

    #[test]
    fn session_config_conversion() {
        let mut cfg = ViewerConfig::default();
        cfg.network.connect_timeout_ms = 0;
        cfg.display.width = 640;
        cfg.display.height = 480;
        let s = cfg.to_session_config();
        assert_eq!(s.connect_timeout, Duration::from_millis(1));
        assert_eq!(s.read_timeout, Duration::from_secs(10));
        assert_eq!(s.viewport, Viewport::new(640, 480));
    }

    #[test]
    fn stats_interval_can_be_disabled() {
        let mut cfg = ViewerConfig::default();
        assert_eq!(cfg.stats_interval(), Some(Duration::from_secs(5)));
        cfg.display.stats_interval_secs = 0;
        assert_eq!(cfg.stats_interval(), None);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("deskcast-viewer-{}.toml", std::process::id()));
        std::fs::write(&path, "network = 3").unwrap();
        let cfg = ViewerConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.network.host, "127.0.0.1");
    }
}
