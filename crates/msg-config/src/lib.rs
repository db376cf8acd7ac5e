//! Messaging configuration
//!
//! Loaded from a TOML file, then overridden from the environment.
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `MSG_CONFIG` | Path of the TOML file (default `config.toml`) |
//! | `MSG_DATABASE_URL` | `database.url` |
//! | `MSG_SERVER_PORT` | `server.port` |
//! | `MSG_DISPATCHER_CONCURRENCY` | `dispatcher.concurrency` |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use msg_common::logging::LogFormat;
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_ENV: &str = "MSG_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Keys accepted under `[retry.overrides]`. `letter` covers the digital phase
/// of a letter and wins over `digital_mail` there.
pub const RETRY_OVERRIDE_KEYS: [&str; 7] = [
    "sms",
    "email",
    "web_message",
    "digital_mail",
    "snail_mail",
    "letter",
    "message",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub retry: RetryConfig,
    pub senders: SendersConfig,
    pub feedback: HttpEndpointConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://messaging.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently running processor invocations
    pub concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { concurrency: 16 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    fn validate(&self, scope: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(format!("{scope}.max_attempts must be at least 1")));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "{scope}.initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        if !(self.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!("{scope}.multiplier must be >= 1.0")));
        }
        Ok(())
    }
}

/// Default retry settings plus per-channel overrides keyed by lowercase
/// channel name (`sms`, `email`, `digital_mail`, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(flatten)]
    pub default: RetrySettings,
    #[serde(default)]
    pub overrides: HashMap<String, RetrySettings>,
}

impl RetryConfig {
    pub fn for_channel(&self, channel: &str) -> RetrySettings {
        self.overrides
            .get(&channel.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default)
    }

    /// Settings of the first listed channel that has an override
    pub fn first_override(&self, channels: &[&str]) -> RetrySettings {
        channels
            .iter()
            .find_map(|channel| self.overrides.get(&channel.to_ascii_lowercase()).copied())
            .unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEndpointConfig {
    pub base_url: String,
    pub path: String,
    pub api_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for HttpEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            path: String::new(),
            api_token: None,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl HttpEndpointConfig {
    fn with_path(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendersConfig {
    pub sms: HttpEndpointConfig,
    pub email: HttpEndpointConfig,
    pub web_message: HttpEndpointConfig,
    pub digital_mail: HttpEndpointConfig,
    pub snail_mail: HttpEndpointConfig,
}

impl Default for SendersConfig {
    fn default() -> Self {
        Self {
            sms: HttpEndpointConfig::with_path("sms"),
            email: HttpEndpointConfig::with_path("email"),
            web_message: HttpEndpointConfig::with_path("webmessages"),
            digital_mail: HttpEndpointConfig::with_path("digital-mail"),
            snail_mail: HttpEndpointConfig::with_path("snail-mail"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The file was absent, built-in defaults apply
    Defaults(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults(path) => write!(f, "defaults ({} not found)", path.display()),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. A missing file yields defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    /// Load from `MSG_CONFIG` (or `config.toml`) and apply environment overrides.
    /// Runs before logging is set up, so the caller reports the source.
    pub fn load() -> Result<(Self, ConfigSource)> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let (mut config, source) = Self::load_from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok((config, source))
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MSG_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(port) = lookup("MSG_SERVER_PORT") {
            self.server.port = parse_env("MSG_SERVER_PORT", &port)?;
        }
        if let Some(concurrency) = lookup("MSG_DISPATCHER_CONCURRENCY") {
            self.dispatcher.concurrency = parse_env("MSG_DISPATCHER_CONCURRENCY", &concurrency)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.concurrency == 0 {
            return Err(ConfigError::Invalid("dispatcher.concurrency must be at least 1".to_string()));
        }
        self.retry.default.validate("retry")?;
        for (channel, settings) in &self.retry.overrides {
            if !RETRY_OVERRIDE_KEYS.contains(&channel.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "retry.overrides.{channel} is not a known channel (expected one of {})",
                    RETRY_OVERRIDE_KEYS.join(", ")
                )));
            }
            settings.validate(&format!("retry.overrides.{channel}"))?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[database]
url = "sqlite::memory:"

[dispatcher]
concurrency = 4

[retry]
max_attempts = 5
initial_delay_ms = 200
max_delay_ms = 5000

[retry.overrides.letter]
max_attempts = 2
initial_delay_ms = 1000
max_delay_ms = 1000

[senders.sms]
base_url = "http://sms-sender:8080"
path = "sms"

[feedback]
base_url = "http://feedback-settings:8080"
path = "settings"

[logging]
format = "json"
"#;

    #[test]
    fn test_parse_sample() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.dispatcher.concurrency, 4);
        assert_eq!(config.retry.default.max_attempts, 5);
        assert_eq!(config.retry.default.multiplier, 2.0);
        assert_eq!(config.senders.sms.base_url, "http://sms-sender:8080");
        assert_eq!(config.senders.email.path, "email");
        assert_eq!(config.feedback.path, "settings");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_retry_override_per_channel() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.retry.for_channel("LETTER").max_attempts, 2);
        assert_eq!(config.retry.for_channel("letter").max_delay_ms, 1000);
        assert_eq!(config.retry.for_channel("SMS").max_attempts, 5);
    }

    #[test]
    fn test_letter_override_wins_for_digital_phase() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.retry.first_override(&["letter", "digital_mail"]).max_attempts, 2);

        let raw = "[retry.overrides.digital_mail]\nmax_attempts = 7\n";
        let config = AppConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.retry.first_override(&["letter", "digital_mail"]).max_attempts, 7);
        assert_eq!(config.retry.first_override(&["letter"]), RetrySettings::default());
    }

    #[test]
    fn test_rejects_unknown_override_key() {
        let raw = "[retry.overrides.fax]\nmax_attempts = 2\n";
        let err = AppConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("retry.overrides.fax"));
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.dispatcher.concurrency, 16);
        assert_eq!(config.retry.default, RetrySettings::default());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = AppConfig::from_toml_str("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_initial_delay_above_max() {
        let raw = "[retry.overrides.sms]\ninitial_delay_ms = 10\nmax_delay_ms = 5\n";
        let err = AppConfig::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("retry.overrides.sms"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        let env: HashMap<&str, &str> = [
            ("MSG_DATABASE_URL", "sqlite:///var/lib/messaging.db"),
            ("MSG_SERVER_PORT", "9191"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.url, "sqlite:///var/lib/messaging.db");
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.dispatcher.concurrency, 16);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|key| (key == "MSG_DISPATCHER_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let (config, source) = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.dispatcher.concurrency, 4);
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let (config, source) = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.dispatcher.concurrency, 16);
        assert_eq!(source, ConfigSource::Defaults(path.clone()));
        assert!(source.to_string().contains("not found"));
    }
}
