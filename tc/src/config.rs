//! Trip client configuration types and loading

use eyre::{Context, Result, eyre};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main trip client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: String,

    /// Backend server location
    pub server: ServerConfig,

    /// Session connection behavior
    pub connection: ConnectionConfig,

    /// Session state machine settings
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            connection: ConnectionConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tripclient.yml
        let local_config = PathBuf::from(".tripclient.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tripclient/tripclient.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => [Some(PathBuf::from(".tripclient.yml")), user_config_path()]
                .into_iter()
                .flatten()
                .collect(),
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .map(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Websocket endpoint for the planning session
    ///
    /// The session path is served as the protocol upgrade of the HTTP base URL,
    /// so `http://host:8000` becomes `ws://host:8000/ws/plan`.
    pub fn session_endpoint(&self) -> Result<String> {
        let mut url = Url::parse(&self.server.base_url)
            .context(format!("Invalid server base-url: {}", self.server.base_url))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(eyre!("Unsupported server scheme '{}': use http or https", other)),
        };
        url.set_scheme(scheme)
            .map_err(|_| eyre!("Cannot upgrade {} to {}", self.server.base_url, scheme))?;
        url.set_path(&self.connection.path);

        Ok(url.to_string())
    }

    /// Plain HTTP URL for an adjacent request/response path (health, cache stats)
    pub fn http_url(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.server.base_url)
            .context(format!("Invalid server base-url: {}", self.server.base_url))?;
        base.join(path).context(format!("Invalid path: {}", path))
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tripclient").join("tripclient.yml"))
}

/// Backend server location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP base URL of the planning service
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Connection lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Path of the planning session endpoint
    pub path: String,

    /// Interval between keepalive pings in seconds
    #[serde(rename = "keepalive-secs")]
    pub keepalive_secs: u64,

    /// Fixed delay before the single reconnect attempt after an abnormal closure
    #[serde(rename = "reconnect-delay-ms")]
    pub reconnect_delay_ms: u64,

    /// Timeout for the websocket handshake
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            path: "/ws/plan".to_string(),
            keepalive_secs: 30,
            reconnect_delay_ms: 2000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Session state machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum number of non-whitespace characters in a trip query
    #[serde(rename = "min-query-chars")]
    pub min_query_chars: usize,

    /// Elapsed-time refresh period in milliseconds
    #[serde(rename = "tick-ms")]
    pub tick_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_query_chars: 10,
            tick_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}
