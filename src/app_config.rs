use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Translation config
    pub translation: TranslationConfig,

    /// Path of the progress checkpoint file
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translation: TranslationConfig::default(),
            checkpoint_file: default_checkpoint_file(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Validate the configuration after loading and overriding
    pub fn validate(&self) -> Result<()> {
        self.translation.validate()?;

        if self.checkpoint_file.as_os_str().is_empty() {
            return Err(anyhow!("Checkpoint file path must not be empty"));
        }

        Ok(())
    }
}

/// Settings for the translation service and its backends
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Base URL of the translation inference endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Backend model id to try before the built-in candidates
    #[serde(default)]
    pub preferred_backend: Option<String>,

    /// Number of fragments submitted per backend call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum characters per submitted item; longer items are truncated
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// Marker appended to every item for backends that need a target hint
    #[serde(default = "default_target_hint")]
    pub target_hint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            preferred_backend: None,
            batch_size: default_batch_size(),
            max_input_length: default_max_input_length(),
            target_hint: default_target_hint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TranslationConfig {
    /// Validate translation settings
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than zero"));
        }

        if self.max_input_length == 0 {
            return Err(anyhow!("max_input_length must be greater than zero"));
        }

        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than zero"));
        }

        Url::parse(&self.endpoint)
            .map_err(|e| anyhow!("Invalid translation endpoint '{}': {}", self.endpoint, e))?;

        if let Some(preferred) = &self.preferred_backend {
            if preferred.trim().is_empty() {
                return Err(anyhow!("preferred_backend must not be blank when set"));
            }
        }

        Ok(())
    }
}

/// Log level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("translation_progress.json")
}

fn default_endpoint() -> String {
    "http://localhost:8100".to_string()
}

fn default_batch_size() -> usize {
    2
}

fn default_max_input_length() -> usize {
    400
}

fn default_target_hint() -> String {
    "[PT]".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
