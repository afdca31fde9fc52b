
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const APP_DIR_NAME: &str = "table-memory";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub vectorization: VectorizationConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection and batching settings for the remote embedding API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_batch_size: usize,
    pub retry_times: u32,
    pub retry_delay_ms: u64,
    /// Advisory price used by cost estimates, in USD per million tokens
    pub cost_per_million_tokens: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.siliconflow.cn/v1".to_string(),
            api_key: String::new(),
            model: "BAAI/bge-large-zh-v1.5".to_string(),
            max_batch_size: 100,
            retry_times: 3,
            retry_delay_ms: 1000,
            cost_per_million_tokens: 0.0001,
        }
    }
}

/// Partial update for [`EmbeddingConfig`].
///
/// Every field is overridable; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingConfigUpdate {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_batch_size: Option<usize>,
    pub retry_times: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub cost_per_million_tokens: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorizationConfig {
    /// Vectorize every enabled table the first time a conversation is loaded
    pub auto_vectorize: bool,
}

impl Default for VectorizationConfig {
    fn default() -> Self {
        Self {
            auto_vectorize: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid retry count: {0} (must be between 1 and 10)")]
    InvalidRetryTimes(u32),
    #[error("Invalid retry delay: {0}ms (must be at most 60000)")]
    InvalidRetryDelay(u64),
    #[error("Invalid token cost: {0} (must be a non-negative number)")]
    InvalidCost(f64),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid minimum score: {0} (must be between 0 and 1)")]
    InvalidMinScore(f32),
    #[error("Missing API key")]
    MissingApiKey,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory for the current user
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load the configuration from the default directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to locate config directory")?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.search.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database holding vector collections
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("memory.db")
    }
}

impl EmbeddingConfig {
    /// Validate everything that can be checked without a network round trip.
    ///
    /// The API key is deliberately not required here so that a configuration
    /// can be saved before a key is known; requests check it separately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.max_batch_size == 0 || self.max_batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.max_batch_size));
        }

        if !(1..=10).contains(&self.retry_times) {
            return Err(ConfigError::InvalidRetryTimes(self.retry_times));
        }

        if self.retry_delay_ms > 60_000 {
            return Err(ConfigError::InvalidRetryDelay(self.retry_delay_ms));
        }

        if !self.cost_per_million_tokens.is_finite() || self.cost_per_million_tokens < 0.0 {
            return Err(ConfigError::InvalidCost(self.cost_per_million_tokens));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url =
            Url::parse(&self.api_url).map_err(|_| ConfigError::InvalidUrl(self.api_url.clone()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        Ok(url)
    }

    /// Full URL of the embeddings endpoint
    pub fn embeddings_url(&self) -> Result<String, ConfigError> {
        let base = self.base_url()?;
        Ok(format!("{}/embeddings", base.as_str().trim_end_matches('/')))
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// API key with everything but the last four characters hidden
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.is_empty() {
            return "(not set)".to_string();
        }

        let visible = chars.len().saturating_sub(4);
        chars
            .iter()
            .enumerate()
            .map(|(i, c)| if i < visible { '*' } else { *c })
            .collect()
    }

    /// Apply a partial update and return the merged configuration
    pub fn merged(&self, update: EmbeddingConfigUpdate) -> Self {
        let current = self.clone();
        Self {
            api_url: update.api_url.unwrap_or(current.api_url),
            api_key: update.api_key.unwrap_or(current.api_key),
            model: update.model.unwrap_or(current.model),
            max_batch_size: update.max_batch_size.unwrap_or(current.max_batch_size),
            retry_times: update.retry_times.unwrap_or(current.retry_times),
            retry_delay_ms: update.retry_delay_ms.unwrap_or(current.retry_delay_ms),
            cost_per_million_tokens: update
                .cost_per_million_tokens
                .unwrap_or(current.cost_per_million_tokens),
        }
    }

    pub fn set_api_url(&mut self, api_url: String) -> Result<(), ConfigError> {
        let temp_config = EmbeddingConfig {
            api_url: api_url.clone(),
            ..self.clone()
        };
        temp_config.base_url()?;
        self.api_url = api_url;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_max_batch_size(&mut self, max_batch_size: usize) -> Result<(), ConfigError> {
        if max_batch_size == 0 || max_batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(max_batch_size));
        }
        self.max_batch_size = max_batch_size;
        Ok(())
    }

    pub fn set_retry_times(&mut self, retry_times: u32) -> Result<(), ConfigError> {
        if !(1..=10).contains(&retry_times) {
            return Err(ConfigError::InvalidRetryTimes(retry_times));
        }
        self.retry_times = retry_times;
        Ok(())
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::InvalidMinScore(self.min_score));
        }

        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=100).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }

    pub fn set_min_score(&mut self, min_score: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ConfigError::InvalidMinScore(min_score));
        }
        self.min_score = min_score;
        Ok(())
    }
}
