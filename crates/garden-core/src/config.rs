//! Dashboard configuration.
//!
//! Loaded from `dashboard.toml` in the platform config directory, then
//! overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `GARDEN_TRANSPORT` | `transport.backend` (`store` or `mqtt`) |
//! | `GARDEN_STORE_URL` | `transport.store.url` |
//! | `GARDEN_BROKER` | `transport.mqtt.broker` |
//! | `GARDEN_MQTT_USERNAME`, `GARDEN_MQTT_PASSWORD` | `transport.mqtt.username`, `.password` |
//! | `GARDEN_STATUS_TOPIC`, `GARDEN_COMMAND_TOPIC` | `transport.mqtt.status_topic`, `.command_topic` |
//! | `GARDEN_DEVICE_ID` | `device_id` |
//! | `STREAM_HOST` | `video.stream_host` |
//!
//! # Example
//!
//! ```toml
//! device_id = "main_status"
//!
//! [transport]
//! backend = "mqtt"
//!
//! [transport.mqtt]
//! broker = "wss://broker.example.com:8884/mqtt"
//! status_topic = "smartgarden/status"
//! command_topic = "smartgarden/commands"
//!
//! [refresh]
//! interval = 3
//! push_fallback = 30
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

/// Record identifier the controller writes its status under.
pub const DEFAULT_DEVICE_ID: &str = "main_status";
/// Topic the controller publishes status frames to.
pub const DEFAULT_STATUS_TOPIC: &str = "smartgarden/status";
/// Topic the controller listens on for commands.
pub const DEFAULT_COMMAND_TOPIC: &str = "smartgarden/commands";

/// Shortest allowed refresh interval in seconds.
pub const MIN_REFRESH_SECS: u64 = 1;
/// Longest allowed refresh interval in seconds.
pub const MAX_REFRESH_SECS: u64 = 300;

/// Dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifier of the status record.
    pub device_id: String,
    /// Transport selection and settings.
    pub transport: TransportConfig,
    /// Refresh cycle timing.
    pub refresh: RefreshConfig,
    /// Bounds on transport calls.
    pub timeouts: TimeoutConfig,
    /// Notice display settings.
    pub notices: NoticeConfig,
    /// Video feed settings.
    pub video: VideoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            transport: TransportConfig::default(),
            refresh: RefreshConfig::default(),
            timeouts: TimeoutConfig::default(),
            notices: NoticeConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("GARDEN_TRANSPORT") {
            self.transport.backend = value.parse()?;
        }
        if let Some(url) = get("GARDEN_STORE_URL") {
            self.transport.store.url = Some(url);
        }
        if let Some(broker) = get("GARDEN_BROKER") {
            self.transport.mqtt.broker = Some(broker);
        }
        if let Some(username) = get("GARDEN_MQTT_USERNAME") {
            self.transport.mqtt.username = Some(username);
        }
        if let Some(password) = get("GARDEN_MQTT_PASSWORD") {
            self.transport.mqtt.password = Some(password);
        }
        if let Some(topic) = get("GARDEN_STATUS_TOPIC") {
            self.transport.mqtt.status_topic = topic;
        }
        if let Some(topic) = get("GARDEN_COMMAND_TOPIC") {
            self.transport.mqtt.command_topic = topic;
        }
        if let Some(device_id) = get("GARDEN_DEVICE_ID") {
            self.device_id = device_id;
        }
        if let Some(host) = get("STREAM_HOST") {
            self.video.stream_host = Some(host);
        }
        Ok(())
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - The selected transport has its connection address
    /// - Topics and device identifier are not empty
    /// - Refresh intervals are within 1-300 seconds
    /// - Timeouts are non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.device_id.trim().is_empty() {
            errors.push(ValidationError::new("device_id", "cannot be empty"));
        }
        errors.extend(self.transport.validate());
        errors.extend(self.refresh.validate());
        errors.extend(self.timeouts.validate());

        if let Some(host) = &self.video.stream_host
            && (host.trim().is_empty() || host.contains("://"))
        {
            errors.push(ValidationError::new(
                "video.stream_host",
                "must be a bare host name without a scheme",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Which transport the dashboard uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Poll the status record from the record store.
    #[default]
    Store,
    /// Subscribe to status frames on an MQTT broker.
    Mqtt,
}

impl Backend {
    /// The transport capability this backend provides.
    pub fn kind(self) -> TransportKind {
        match self {
            Backend::Store => TransportKind::Pull,
            Backend::Mqtt => TransportKind::Push,
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" | "pull" => Ok(Backend::Store),
            "mqtt" | "push" => Ok(Backend::Mqtt),
            other => Err(ConfigError::Validation(vec![ValidationError::new(
                "transport.backend",
                format!("unknown backend '{}' (expected 'store' or 'mqtt')", other),
            )])),
        }
    }
}

/// Transport selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub backend: Backend,
    pub store: StoreConfig,
    pub mqtt: MqttConfig,
}

impl TransportConfig {
    /// Validate the settings of the selected backend.
    pub fn validate(&self) -> Vec<ValidationError> {
        match self.backend {
            Backend::Store => self.store.validate(),
            Backend::Mqtt => self.mqtt.validate(),
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection string: a database path, optionally prefixed `sqlite://`.
    pub url: Option<String>,
}

impl StoreConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        match self.url.as_deref().map(str::trim) {
            None | Some("") => vec![ValidationError::new(
                "transport.store.url",
                "connection string is not set",
            )],
            Some(_) => Vec::new(),
        }
    }
}

/// MQTT broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL (`mqtt://`, `mqtts://`, `ws://` or `wss://`).
    pub broker: Option<String>,
    pub status_topic: String,
    pub command_topic: String,
    /// Client identifier. A random one is generated when unset.
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: None,
            status_topic: DEFAULT_STATUS_TOPIC.to_string(),
            command_topic: DEFAULT_COMMAND_TOPIC.to_string(),
            client_id: None,
            username: None,
            password: None,
            keep_alive: 30,
        }
    }
}

impl MqttConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        match self.broker.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push(ValidationError::new("transport.mqtt.broker", "broker URL is not set"))
            }
            Some(url) => {
                if let Err(reason) = crate::transport::mqtt::BrokerAddress::parse(url) {
                    errors.push(ValidationError::new("transport.mqtt.broker", reason));
                }
            }
        }

        for (field, topic) in [
            ("transport.mqtt.status_topic", &self.status_topic),
            ("transport.mqtt.command_topic", &self.command_topic),
        ] {
            if topic.is_empty() {
                errors.push(ValidationError::new(field, "cannot be empty"));
            } else if topic.contains(['#', '+']) {
                errors.push(ValidationError::new(field, "cannot contain wildcards"));
            }
        }

        if self.username.is_some() != self.password.is_some() {
            errors.push(ValidationError::new(
                "transport.mqtt.password",
                "username and password must be set together",
            ));
        }

        if self.keep_alive < 5 {
            errors.push(ValidationError::new(
                "transport.mqtt.keep_alive",
                format!("must be at least 5 seconds, got {}", self.keep_alive),
            ));
        }

        errors
    }
}

/// Refresh cycle timing, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Poll interval for pull transports.
    pub interval: u64,
    /// Fallback refresh interval for push transports.
    pub push_fallback: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: 3,
            push_fallback: 30,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn push_fallback(&self) -> Duration {
        Duration::from_secs(self.push_fallback)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("refresh.interval", self.interval),
            ("refresh.push_fallback", self.push_fallback),
        ] {
            if !(MIN_REFRESH_SECS..=MAX_REFRESH_SECS).contains(&value) {
                errors.push(ValidationError::new(
                    field,
                    format!(
                        "must be between {} and {} seconds, got {}",
                        MIN_REFRESH_SECS, MAX_REFRESH_SECS, value
                    ),
                ));
            }
        }
        errors
    }
}

/// Timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect: u64,
    pub fetch: u64,
    pub send: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: 10,
            fetch: 5,
            send: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch)
    }

    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        [
            ("timeouts.connect", self.connect),
            ("timeouts.fetch", self.fetch),
            ("timeouts.send", self.send),
        ]
        .into_iter()
        .filter(|(_, value)| *value == 0)
        .map(|(field, _)| ValidationError::new(field, "must be greater than 0"))
        .collect()
    }
}

/// Notice display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeConfig {
    /// How long a success notice stays up, in seconds.
    pub success_secs: u64,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self { success_secs: 4 }
    }
}

impl NoticeConfig {
    pub fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_secs)
    }
}

/// Video feed settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Host serving the camera feed, without scheme.
    pub stream_host: Option<String>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `transport.mqtt.broker`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("garden")
        .join("dashboard.toml")
}
