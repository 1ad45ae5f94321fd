//! Configuration for the tether agent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_core::{FrameTag, LinkConfig, RestartPolicy};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Socket and reconnect settings.
    pub link: LinkSection,
    /// Liveness watchdog settings.
    pub watchdog: WatchdogSection,
    /// Daemon restart settings.
    pub restart: RestartSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Socket and reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    /// Control socket path (NUL-delimited JSON).
    pub control_socket: String,
    /// Data socket path (binary frames). Empty disables the data
    /// channel.
    pub data_socket: String,
    /// Delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Capacity of the disconnected-time command buffer.
    pub command_buffer: usize,
}

/// Liveness watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSection {
    /// Check interval in milliseconds.
    pub interval_ms: u64,
    /// Tag names that must be observed in every interval:
    /// "video", "faces", "audio". Empty disables the watchdog.
    pub required: Vec<String>,
}

/// Daemon restart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartSection {
    /// Init service name to cycle on restart. Empty skips service
    /// cycling (socket teardown + reconnect only).
    pub service: String,
    /// Init control program, e.g. "initctl".
    pub control_command: String,
    /// Per-step ceiling in milliseconds.
    pub step_timeout_ms: u64,
    /// Overall restart deadline in milliseconds.
    pub overall_deadline_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            link: LinkSection::default(),
            watchdog: WatchdogSection::default(),
            restart: RestartSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            control_socket: "/run/visiond/control.sock".into(),
            data_socket: "/run/visiond/data.sock".into(),
            reconnect_delay_ms: 1000,
            command_buffer: 32,
        }
    }
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            interval_ms: 4000,
            required: vec!["video".into()],
        }
    }
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            service: "visiond".into(),
            control_command: "initctl".into(),
            step_timeout_ms: 5000,
            overall_deadline_ms: 30_000,
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

impl AgentConfig {
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

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into the core's `LinkConfig`.
    pub fn to_link_config(&self) -> LinkConfig {
        let mut link = LinkConfig::new(&self.link.control_socket);
        if !self.link.data_socket.is_empty() {
            link.data_socket = Some(PathBuf::from(&self.link.data_socket));
        }
        link.reconnect_delay = Duration::from_millis(self.link.reconnect_delay_ms.max(10));
        link.command_buffer = self.link.command_buffer.max(1);
        link.watchdog_interval = Duration::from_millis(self.watchdog.interval_ms.max(100));
        link.required_tags = self
            .watchdog
            .required
            .iter()
            .filter_map(|name| match name.parse::<FrameTag>() {
                Ok(tag) => Some(tag),
                Err(_) => {
                    tracing::warn!(tag = %name, "unknown watchdog tag in config, ignoring");
                    None
                }
            })
            .collect();
        link.restart = RestartPolicy {
            service: (!self.restart.service.is_empty()).then(|| self.restart.service.clone()),
            step_timeout: Duration::from_millis(self.restart.step_timeout_ms.max(100)),
            overall_deadline: Duration::from_millis(self.restart.overall_deadline_ms.max(1000)),
        };
        link
    }
}

// ── Tests ────────────────────────────────────────────────────────
