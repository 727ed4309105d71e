//! Application configuration - every tunable as a TOML value
//!
//! Each section implements `Default` from [`super::defaults`], so an empty or
//! missing file yields a working configuration pointed at the public test
//! broker.

use super::defaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Local config file picked up when no explicit path is given.
pub const LOCAL_CONFIG_FILE: &str = "motor_sentinel.toml";

/// Configuration errors. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub smoothing: SmoothingConfig,

    #[serde(default)]
    pub alert: AlertConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load using the standard search order:
    /// 1. `explicit` path (from `--config` / `MOTOR_SENTINEL_CONFIG`); must exist
    /// 2. `./motor_sentinel.toml` if present
    /// 3. Built-in defaults
    ///
    /// Environment overrides are applied afterwards via [`AppConfig::apply_env`].
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded config");
            return Ok(config);
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(local)?;
            info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
            return Ok(config);
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `MQTT_BROKER`, `MQTT_PORT`, `MODEL_PATH`, `DATA_DIR`,
    /// `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `MOTOR_SENTINEL_SERVER_ADDR`.
    /// Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("MQTT_BROKER") {
            self.broker.host = host;
        }
        if let Some(port) = get("MQTT_PORT") {
            self.broker.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: "MQTT_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(path) = get("MODEL_PATH") {
            self.scoring.model_path = PathBuf::from(path);
        }
        if let Some(dir) = get("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.alert.bot_token = Some(token);
        }
        if let Some(chat) = get("TELEGRAM_CHAT_ID") {
            self.alert.chat_id = Some(chat);
        }
        if let Some(addr) = get("MOTOR_SENTINEL_SERVER_ADDR") {
            self.server.addr = Some(addr);
        }
        Ok(())
    }

    /// Range and consistency checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.broker.host.trim().is_empty() {
            return Err(invalid("broker.host", "must not be empty"));
        }
        if self.broker.port == 0 {
            return Err(invalid("broker.port", "must be non-zero"));
        }
        if self.broker.topic.trim().is_empty() {
            return Err(invalid("broker.topic", "must not be empty"));
        }
        if self.broker.topic.contains(['+', '#']) {
            return Err(invalid("broker.topic", "must be a plain topic, not a wildcard filter"));
        }
        if self.broker.client_id.trim().is_empty() {
            return Err(invalid("broker.client_id", "must not be empty"));
        }
        if self.broker.keep_alive_secs < defaults::MIN_KEEP_ALIVE_SECS {
            return Err(invalid(
                "broker.keep_alive_secs",
                format!("must be at least {}", defaults::MIN_KEEP_ALIVE_SECS),
            ));
        }
        if self.broker.connect_timeout_secs == 0 {
            return Err(invalid("broker.connect_timeout_secs", "must be non-zero"));
        }
        if self.smoothing.window_size == 0 {
            return Err(invalid("smoothing.window_size", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.alert.threshold) {
            return Err(invalid(
                "alert.threshold",
                format!("{} is outside [0, 1]", self.alert.threshold),
            ));
        }
        if self.alert.timeout_secs == 0 {
            return Err(invalid("alert.timeout_secs", "must be non-zero"));
        }
        if let Some(addr) = &self.server.addr {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(invalid("server.addr", format!("'{addr}' is not HOST:PORT")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// MQTT feed connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub backlog_warning: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: defaults::BROKER_HOST.to_string(),
            port: defaults::BROKER_PORT,
            topic: defaults::FEED_TOPIC.to_string(),
            client_id: defaults::CLIENT_ID.to_string(),
            keep_alive_secs: defaults::KEEP_ALIVE_SECS,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            backlog_warning: defaults::BACKLOG_WARNING,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Path to the JSON model artifact
    pub model_path: PathBuf,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(defaults::MODEL_PATH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds the sled database and the instance lock file
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
        }
    }
}

impl StorageConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(defaults::STORE_DIR_NAME)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub window_size: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: defaults::WINDOW_SIZE,
        }
    }
}

/// Alert dispatch. Without both `bot_token` and `chat_id` alerting is a
/// logged no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub threshold: f64,
    pub timeout_secs: u64,
    pub api_base: String,
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::ALERT_THRESHOLD,
            timeout_secs: defaults::ALERT_TIMEOUT_SECS,
            api_base: defaults::TELEGRAM_API_BASE.to_string(),
            bot_token: None,
            chat_id: None,
        }
    }
}

impl AlertConfig {
    /// Bot token and chat id, when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token, chat))
            }
            _ => None,
        }
    }
}

/// Status HTTP API. Disabled when `addr` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: Option<String>,
}
