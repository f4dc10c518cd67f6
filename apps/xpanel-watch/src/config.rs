//! Watcher configuration.
//!
//! Stored as TOML, by default at `~/.config/xpanel/watch.toml`. A path
//! given as the first command-line argument overrides the default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use xpanel_live::{LiveConfig, ReconnectPolicy};
use xpanel_protocol::constants::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY};

/// Watcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Live channel endpoint of the panel server.
    #[serde(default = "default_url")]
    pub url: String,

    /// Auth token. The watcher stays offline while this is empty.
    #[serde(default)]
    pub token: String,

    /// Sent as the handshake `User-Agent` (hostname by default).
    #[serde(default = "default_client_name")]
    pub client_name: String,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    /// Server rooms to join once connected.
    #[serde(default)]
    pub watch_servers: Vec<String>,

    /// Terminal command sent once after the first connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSection {
    pub server_id: String,
    pub command: String,
}

fn default_url() -> String {
    "ws://127.0.0.1:5000/live".into()
}

fn default_client_name() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".into());
    format!("xpanel-watch/{} ({host})", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY.as_millis() as u64
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: String::new(),
            client_name: default_client_name(),
            reconnect: ReconnectSection::default(),
            watch_servers: Vec::new(),
            command: None,
        }
    }
}

impl WatchConfig {
    /// Loads the configuration at `path`, creating it with defaults if it
    /// does not exist.
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: WatchConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = WatchConfig::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Holds the auth token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// Settings for the connection manager.
    pub fn live_config(&self) -> LiveConfig {
        let mut config = LiveConfig::new(self.url.clone()).with_reconnect(ReconnectPolicy {
            max_attempts: self.reconnect.max_attempts,
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
        });
        if self.has_token() {
            config = config.with_token(self.token.trim());
        }
        if !self.client_name.is_empty() {
            config.client_name = Some(self.client_name.clone());
        }
        config
    }
}

/// Resolves the configuration path: explicit argument first, then the
/// per-user default.
pub fn config_path(arg: Option<PathBuf>) -> PathBuf {
    if let Some(path) = arg {
        return path;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("xpanel")
        .join("watch.toml")
}
