//! Configuration
//!
//! Centralized configuration for the orchestration core, loaded with the
//! following priority (highest first):
//!
//! 1. Environment variables
//! 2. TOML configuration file
//! 3. Default values
//!
//! The configuration file follows the XDG Base Directory specification:
//! `$XDG_CONFIG_HOME/confab/confab.toml` (typically
//! `~/.config/confab/confab.toml`).
//!
//! # Example Configuration
//!
//! ```toml
//! model = "claude-3-haiku-20240307"
//! locale = "nl"
//!
//! [limits]
//! max_context_messages = 50
//! max_message_bytes = 32768
//! max_tokens = 4096
//!
//! [provider]
//! base_url = "https://api.anthropic.com"
//! api_key = "sk-ant-..."
//! request_timeout_ms = 60000
//! temperature = 1.0
//!
//! [sequencer]
//! acquire_timeout_ms = 5000
//!
//! [retry]
//! max_attempts = 1
//! backoff_ms = 250
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config file at {path}: {source}")]
    Read {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Core Configuration
// =============================================================================

/// Runtime configuration for the orchestration core
#[derive(Clone, Debug, PartialEq)]
pub struct CoreConfig {
    /// Model identifier sent to the provider
    pub model: String,
    /// Locale code for the mode registry (`"en"`, `"nl"`)
    pub locale: String,
    /// Maximum settled messages included in prompt context
    pub max_context_messages: usize,
    /// Maximum accepted user message size in bytes
    pub max_message_bytes: usize,
    /// Response token budget per generation
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Bound on upstream waits, in milliseconds
    pub request_timeout_ms: u64,
    /// Sequencer wait bound in milliseconds; 0 means fail-fast
    pub acquire_timeout_ms: u64,
    /// Retries before the first byte (0 disables retrying)
    pub retry_max_attempts: u32,
    /// Base retry backoff in milliseconds
    pub retry_backoff_ms: u64,
    /// Provider API base URL
    pub base_url: String,
    /// Provider API key, if configured
    pub api_key: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-haiku-20240307".to_string(),
            locale: "en".to_string(),
            max_context_messages: 50,
            max_message_bytes: 32 * 1024,
            max_tokens: 4096,
            temperature: 1.0,
            request_timeout_ms: 60_000,
            acquire_timeout_ms: 5_000,
            retry_max_attempts: 1,
            retry_backoff_ms: 250,
            base_url: "https://api.anthropic.com".to_string(),
            api_key: None,
        }
    }
}

impl CoreConfig {
    /// Build configuration from environment variables over defaults
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("CONFAB_MODEL") {
            self.model = model;
        }
        if let Ok(locale) = std::env::var("CONFAB_LOCALE") {
            self.locale = locale;
        }
        if let Some(value) = env_parse("CONFAB_MAX_CONTEXT") {
            self.max_context_messages = value;
        }
        if let Some(value) = env_parse("CONFAB_MAX_MESSAGE_BYTES") {
            self.max_message_bytes = value;
        }
        if let Some(value) = env_parse("CONFAB_MAX_TOKENS") {
            self.max_tokens = value;
        }
        if let Some(value) = env_parse("CONFAB_TEMPERATURE") {
            self.temperature = value;
        }
        if let Some(value) = env_parse("CONFAB_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = value;
        }
        if let Some(value) = env_parse("CONFAB_ACQUIRE_TIMEOUT_MS") {
            self.acquire_timeout_ms = value;
        }
        if let Some(value) = env_parse("CONFAB_RETRY_MAX") {
            self.retry_max_attempts = value;
        }
        if let Some(value) = env_parse("CONFAB_RETRY_BACKOFF_MS") {
            self.retry_backoff_ms = value;
        }
        if let Ok(url) = std::env::var("CONFAB_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(key) = std::env::var("CONFAB_API_KEY").or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
        {
            self.api_key = Some(key);
        }
    }

    /// Bound on upstream waits
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Sequencer wait bound (zero = fail-fast)
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Base retry backoff
    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_context_messages == 0 {
            return Err(ConfigError::Invalid(
                "max_context_messages must be at least 1".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_message_bytes must be at least 1".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0.0, 1.0], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Parse an environment variable, ignoring unset or malformed values
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

// =============================================================================
// TOML File Structures
// =============================================================================

/// Limits section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsToml {
    /// Maximum settled messages in prompt context
    pub max_context_messages: Option<usize>,
    /// Maximum accepted user message size in bytes
    pub max_message_bytes: Option<usize>,
    /// Response token budget
    pub max_tokens: Option<u32>,
}

/// Provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// API base URL
    pub base_url: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Bound on upstream waits, in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Sequencer section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerToml {
    /// Wait bound in milliseconds; 0 means fail-fast
    pub acquire_timeout_ms: Option<u64>,
}

/// Retry section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryToml {
    /// Retries before the first byte
    pub max_attempts: Option<u32>,
    /// Base backoff in milliseconds
    pub backoff_ms: Option<u64>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfabToml {
    /// Model identifier
    pub model: Option<String>,
    /// Locale code for the mode registry
    pub locale: Option<String>,
    /// Limits section
    pub limits: LimitsToml,
    /// Provider section
    pub provider: ProviderToml,
    /// Sequencer section
    pub sequencer: SequencerToml,
    /// Retry section
    pub retry: RetryToml,
}

impl ConfabToml {
    /// Overlay the file values onto a configuration
    pub fn apply_to(&self, config: &mut CoreConfig) {
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if let Some(ref locale) = self.locale {
            config.locale = locale.clone();
        }
        if let Some(value) = self.limits.max_context_messages {
            config.max_context_messages = value;
        }
        if let Some(value) = self.limits.max_message_bytes {
            config.max_message_bytes = value;
        }
        if let Some(value) = self.limits.max_tokens {
            config.max_tokens = value;
        }
        if let Some(ref url) = self.provider.base_url {
            config.base_url = url.clone();
        }
        if let Some(ref key) = self.provider.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(value) = self.provider.request_timeout_ms {
            config.request_timeout_ms = value;
        }
        if let Some(value) = self.provider.temperature {
            config.temperature = value;
        }
        if let Some(value) = self.sequencer.acquire_timeout_ms {
            config.acquire_timeout_ms = value;
        }
        if let Some(value) = self.retry.max_attempts {
            config.retry_max_attempts = value;
        }
        if let Some(value) = self.retry.backoff_ms {
            config.retry_backoff_ms = value;
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path (`~/.config/confab/confab.toml`)
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("confab")
        .join("confab.toml")
}

/// Load configuration from an explicit file path, then overlay environment
pub fn load_config_from_path(path: &Path) -> Result<CoreConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ConfabToml = toml::from_str(&contents)?;

    let mut config = CoreConfig::default();
    file.apply_to(&mut config);
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Load configuration from the default path
///
/// A missing file is not an error: defaults plus environment apply.
pub fn load_config() -> Result<CoreConfig, ConfigError> {
    let path = default_config_path();
    if path.exists() {
        load_config_from_path(&path)
    } else {
        let config = CoreConfig::from_env();
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================
