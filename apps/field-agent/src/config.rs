//! Field agent configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/fleetops/field-agent.toml`
//! - Windows: `%APPDATA%/fleetops/field-agent.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetops_live_connection::{LinkConfig, ReconnectConfig};
use fleetops_protocol::constants::{
    CONNECT_TIMEOUT, HEARTBEAT_PERIOD, RECONNECT_BASE_DELAY, RECONNECT_MAX_ATTEMPTS,
};

/// Field agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAgentConfig {
    /// Name reported in logs (hostname by default).
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Live link endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// REST backend root used for the profile check.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Host probed to decide whether the app starts online.
    #[serde(default = "default_reachability_host")]
    pub reachability_host: String,

    #[serde(default = "default_reachability_port")]
    pub reachability_port: u16,

    /// Overrides the platform credentials file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,

    /// Overrides the platform session cache file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cache_path: Option<PathBuf>,

    #[serde(default)]
    pub link: LinkSettings,
}

/// Live link timing overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub connect_timeout_secs: u64,
    pub heartbeat_secs: u64,
    pub max_attempts: u32,
    pub base_delay_secs: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT.as_secs(),
            heartbeat_secs: HEARTBEAT_PERIOD.as_secs(),
            max_attempts: RECONNECT_MAX_ATTEMPTS,
            base_delay_secs: RECONNECT_BASE_DELAY.as_secs(),
        }
    }
}

fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "FleetOps Field Agent".into())
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:8000/ws/locations/".into()
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_reachability_host() -> String {
    "127.0.0.1".into()
}

fn default_reachability_port() -> u16 {
    8000
}

impl Default for FieldAgentConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            endpoint: default_endpoint(),
            api_base_url: default_api_base_url(),
            reachability_host: default_reachability_host(),
            reachability_port: default_reachability_port(),
            credentials_path: None,
            session_cache_path: None,
            link: LinkSettings::default(),
        }
    }
}

impl FieldAgentConfig {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: FieldAgentConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = FieldAgentConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Builds the live link settings.
    pub fn link_config(&self) -> LinkConfig {
        let heartbeat = Duration::from_secs(self.link.heartbeat_secs.max(1));
        LinkConfig {
            connect_timeout: Duration::from_secs(self.link.connect_timeout_secs.max(1)),
            heartbeat_period: heartbeat,
            idle_timeout: heartbeat * 3,
            reconnect: ReconnectConfig {
                max_attempts: self.link.max_attempts,
                base_delay: Duration::from_secs(self.link.base_delay_secs),
            },
            ..LinkConfig::new(self.endpoint.clone())
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    fleetops_live_connection::credentials::config_dir()
        .map(|d| d.join("fleetops").join("field-agent.toml"))
        .ok_or_else(|| anyhow::anyhow!("no configuration directory available"))
}
