//! Configuration loading and validation for Mentora.
//!
//! Loads configuration from a TOML file (default `mentora.toml`, overridable
//! via the `MENTORA_CONFIG` environment variable). Every field has a serde
//! default, so an empty file — or no file at all — yields a working setup.
//! Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "MENTORA_CONFIG";

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mentora.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation port tuning
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Validation retry tuning
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Hint behavior
    #[serde(default)]
    pub hints: HintConfig,

    /// Safe fallback texts
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Event plumbing
    #[serde(default)]
    pub events: EventConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Per-call deadline in seconds
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Retries for transient failures
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Base backoff in milliseconds (doubles per retry)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_deadline_secs() -> u64 {
    30
}
fn default_transient_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    250
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            transient_retries: default_transient_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// How many committed exchanges the prompt history carries
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_history() -> usize {
    10
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintConfig {
    /// Canned hints served when generation fails, indexed by level
    #[serde(default = "default_hint_fallbacks")]
    pub fallback_texts: Vec<String>,
}

fn default_hint_fallbacks() -> Vec<String> {
    vec![
        "Take another look at the screen's topic — which concept does this exercise practice?".into(),
        "Focus on the first step only. What has to happen before anything else?".into(),
        "Walk through the first step together: write down what you know, then what is missing.".into(),
    ]
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            fallback_texts: default_hint_fallbacks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// The canned safe response served after rejection or generation failure
    #[serde(default = "default_fallback_text")]
    pub safe_response: String,
}

fn default_fallback_text() -> String {
    "Let me think about that differently. Could you tell me, in your own words, \
     what part feels most confusing right now?"
        .into()
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            safe_response: default_fallback_text(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Per-submission event channel capacity
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    /// Domain event bus capacity
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_stream_buffer() -> usize {
    64
}
fn default_bus_capacity() -> usize {
    256
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            stream_buffer: default_stream_buffer(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Load from `MENTORA_CONFIG` or the default path; missing file falls
    /// back to defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let path = Path::new(&path);
        if !path.exists() {
            debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.deadline_secs == 0 {
            return Err(ConfigError::Invalid(
                "generation.deadline_secs must be positive".into(),
            ));
        }
        if self.events.stream_buffer == 0 {
            return Err(ConfigError::Invalid(
                "events.stream_buffer must be positive".into(),
            ));
        }
        if self.events.bus_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events.bus_capacity must be positive".into(),
            ));
        }
        if self.fallback.safe_response.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "fallback.safe_response must not be empty".into(),
            ));
        }
        if self.hints.fallback_texts.is_empty() {
            return Err(ConfigError::Invalid(
                "hints.fallback_texts must not be empty".into(),
            ));
        }
        Ok(())
    }
}
