//! Configuration for the Annadata monitor.

use crate::core::monitor::RetryPolicy;
use crate::core::window::DEFAULT_WINDOW_SIZE;
use crate::source::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable holding the MongoDB connection string.
pub const MONGODB_URI_ENV: &str = "MONGODB_URI";

const APP_DIR: &str = "annadata-monitor";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of readings in the change-detection window
    pub window_size: usize,

    /// Where readings come from
    pub source: SourceKind,

    /// Buffered readings between the HTTP ingest and the monitor
    pub channel_capacity: usize,

    pub server: ServerSettings,

    pub models: ModelConfig,

    pub advice: AdviceConfig,

    pub store: StoreConfig,

    pub dispatch: DispatchConfig,

    /// Path for statistics and the default store
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();

        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            source: SourceKind::default(),
            channel_capacity: 64,
            server: ServerSettings::default(),
            models: ModelConfig::default(),
            advice: AdviceConfig::default(),
            store: StoreConfig::Jsonl {
                dir: data_dir.join("store"),
            },
            dispatch: DispatchConfig::default(),
            data_path: data_dir,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Load configuration from the default location, then apply secrets from
    /// the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            Self::from_json(&content)?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location. Secrets are not written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Path of the persisted monitor statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("monitor_stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        if let StoreConfig::Jsonl { dir } = &self.store {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        Ok(())
    }

    /// Read secrets from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(GEMINI_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.advice.api_key = Some(key);
        }
        if let StoreConfig::Mongo { uri, .. } = &mut self.store {
            if let Some(value) = lookup(MONGODB_URI_ENV).filter(|v| !v.is_empty()) {
                *uri = Some(value);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be positive".to_string(),
            ));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Weight files and download settings for the classifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Tabular crop model weights (JSON)
    pub crop_weights: PathBuf,

    /// Image disease model weights (JSON)
    pub disease_weights: PathBuf,

    /// Timeout for image downloads
    #[serde(with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let models_dir = default_data_dir().join("models");

        Self {
            crop_weights: models_dir.join("crop_model.json"),
            disease_weights: models_dir.join("disease_model.json"),
            download_timeout: Duration::from_secs(30),
        }
    }
}

/// Generative advice settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdviceConfig {
    pub model: String,

    /// Region named in the advice prompt
    pub region: String,

    #[serde(with = "duration_serde")]
    pub timeout: Duration,

    /// Read from `GEMINI_API_KEY`, never serialized
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            region: "Punjab".to_string(),
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }
}

/// Document store backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// JSON-lines files under `dir`
    Jsonl { dir: PathBuf },
    /// In-process only, lost on exit
    Memory,
    /// MongoDB; the connection string comes from `MONGODB_URI`
    Mongo {
        #[serde(skip)]
        uri: Option<String>,
        #[serde(default = "default_database")]
        database: String,
    },
}

fn default_database() -> String {
    "annadata".to_string()
}

/// Retry settings for the dispatch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_attempts: u32,
    /// Delay before the first retry, doubled per attempt
    pub retry_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            retry_backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
