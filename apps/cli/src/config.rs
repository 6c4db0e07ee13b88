//! Monitor configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/pulseboard/cli.toml`
//! - Windows: `%APPDATA%/pulseboard/cli.toml`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pulseboard_client::{ClientConfig, ReconnectConfig};
use pulseboard_protocol::constants::channels;

/// CLI monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Display name of this monitor (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    /// WebSocket URL of the dashboard backend.
    #[serde(default = "default_url")]
    pub url: String,

    /// Start in mock mode instead of dialing the backend.
    #[serde(default)]
    pub mock_mode: bool,

    /// Connect on startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Streams to register and watch.
    #[serde(default = "default_streams")]
    pub streams: Vec<String>,

    /// Initial reconnection delay in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_reconnect_delay_ms: u64,

    /// Reconnection delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_reconnect_delay_ms: u64,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "pulseboard".into())
}

fn default_url() -> String {
    "ws://localhost:3000".into()
}

fn default_true() -> bool {
    true
}

fn default_streams() -> Vec<String> {
    vec![
        channels::METRICS.into(),
        channels::HEALTH_METRICS.into(),
        channels::PERFORMANCE_METRICS.into(),
        channels::DATABASE.into(),
        channels::GRAPHQL.into(),
    ]
}

fn default_initial_delay_ms() -> u64 {
    5000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            url: default_url(),
            mock_mode: false,
            auto_connect: true,
            streams: default_streams(),
            initial_reconnect_delay_ms: default_initial_delay_ms(),
            max_reconnect_delay_ms: default_max_delay_ms(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from disk, creating a default file on first
    /// run.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: CliConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = CliConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// The stream-client configuration this file describes.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url.clone(),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(self.initial_reconnect_delay_ms),
                max_delay: Duration::from_millis(self.max_reconnect_delay_ms),
                ..ReconnectConfig::default()
            },
            mock_mode: self.mock_mode,
        }
    }
}

/// Platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("pulseboard").join("cli.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("pulseboard")
            .join("cli.toml"))
    }
}
