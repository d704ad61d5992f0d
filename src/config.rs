//! # Configuration
//!
//! Application configuration loading and management.
//!
//! # Configuration Sources
//!
//! Configuration is loaded in the following order (later sources override earlier):
//! 1. Default values
//! 2. Configuration file (if exists)
//! 3. Environment variables (prefixed with `OMNICHAIN_`)
//!
//! Per-chain endpoints are not read here: `rpc_urls` in the file sets them
//! explicitly, and `{KEY}_RPC_URL` variables are picked up by the chain
//! registry.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `OMNICHAIN_CONFIG_FILE` | Configuration file path | `omnichain.toml` |
//! | `OMNICHAIN_EVM_PRIVATE_KEY` | EVM hex private key | unset |
//! | `OMNICHAIN_EVM_MNEMONIC` | EVM BIP-39 phrase | unset |
//! | `OMNICHAIN_EVM_DERIVATION_PATH` | EVM derivation path | `m/44'/60'/0'/0/0` |
//! | `OMNICHAIN_ALT_PRIVATE_KEY` | Solana secret key (base58 or JSON bytes) | unset |
//! | `OMNICHAIN_DEFAULT_CHAIN` | Initial EVM chain | `ETHEREUM` |
//! | `OMNICHAIN_ALT_CHAIN` | Solana cluster key | `SOLANA` |
//! | `OMNICHAIN_ALT_COMMITMENT` | Solana commitment | `confirmed` |
//! | `OMNICHAIN_LOG_LEVEL` | Log level | `info` |
//! | `OMNICHAIN_LOG_FORMAT` | Log format (json/pretty) | `json` |
//! | `OMNICHAIN_MAX_ATTEMPTS` | Retry attempt bound | `3` |
//!
//! # Examples
//!
//! ```ignore
//! use omnichain::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("default chain: {}", config.default_chain);
//! ```

use crate::application::services::batch::BatchConfig;
use crate::application::services::retry::RetryPolicy;
use crate::infrastructure::blockchain::ethereum::EvmSigner;
use crate::infrastructure::blockchain::solana::Commitment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse configuration.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// Invalid configuration value.
    #[error("invalid config value for {field}: {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (structured logging).
    #[default]
    Json,
    /// Pretty format (human-readable).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error) or a filter directive
    /// such as `info,omnichain=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include target (module path) in logs.
    #[serde(default = "default_true")]
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Json,
            include_target: true,
        }
    }
}

// ============================================================================
// Signing Configuration
// ============================================================================

/// Signing material for both families. Every field is optional; a family
/// without material gets no handle.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// EVM hex private key. Takes precedence over the mnemonic.
    #[serde(default)]
    pub evm_private_key: Option<String>,

    /// EVM BIP-39 phrase.
    #[serde(default)]
    pub evm_mnemonic: Option<String>,

    /// Derivation path for the mnemonic.
    #[serde(default)]
    pub evm_derivation_path: Option<String>,

    /// Solana secret key: base58 keypair or seed, or a JSON byte array.
    #[serde(default)]
    pub alt_private_key: Option<String>,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("SigningConfig")
            .field("evm_private_key", &redact(&self.evm_private_key))
            .field("evm_mnemonic", &redact(&self.evm_mnemonic))
            .field("evm_derivation_path", &self.evm_derivation_path)
            .field("alt_private_key", &redact(&self.alt_private_key))
            .finish()
    }
}

impl SigningConfig {
    /// EVM signing material, if any is configured.
    #[must_use]
    pub fn evm_signer(&self) -> Option<EvmSigner> {
        if let Some(key) = non_empty(&self.evm_private_key) {
            return Some(EvmSigner::PrivateKey(key.to_string()));
        }
        non_empty(&self.evm_mnemonic).map(|phrase| EvmSigner::Mnemonic {
            phrase: phrase.to_string(),
            path: non_empty(&self.evm_derivation_path).map(str::to_string),
        })
    }

    /// Solana secret key, if configured.
    #[must_use]
    pub fn alt_secret(&self) -> Option<&str> {
        non_empty(&self.alt_private_key)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,

    /// Signing material.
    #[serde(default)]
    pub signing: SigningConfig,

    /// Per-chain endpoint overrides, keyed by chain key.
    #[serde(default)]
    pub rpc_urls: BTreeMap<String, String>,

    /// Retry policy for state-changing operations.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Batch execution settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Bound on confirmation waits, in seconds.
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// HTTP request timeout for the Solana client, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Chain the EVM handle binds to at startup.
    #[serde(default = "default_chain")]
    pub default_chain: String,

    /// Cluster the Solana handle binds to.
    #[serde(default = "default_alt_chain")]
    pub alt_chain: String,

    /// Solana commitment level.
    #[serde(default)]
    pub alt_commitment: Commitment,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            signing: SigningConfig::default(),
            rpc_urls: BTreeMap::new(),
            retry: RetryPolicy::default(),
            batch: BatchConfig::default(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            request_timeout_secs: default_request_timeout(),
            default_chain: default_chain(),
            alt_chain: default_alt_chain(),
            alt_commitment: Commitment::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment variables and optional config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let config_path = std::env::var("OMNICHAIN_CONFIG_FILE")
            .unwrap_or_else(|_| "omnichain.toml".to_string());

        if Path::new(&config_path).exists() {
            config = Self::from_file(&config_path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Confirmation wait bound.
    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Solana HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `OMNICHAIN_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Signing material
        if let Some(key) = lookup("OMNICHAIN_EVM_PRIVATE_KEY") {
            self.signing.evm_private_key = Some(key);
        }
        if let Some(phrase) = lookup("OMNICHAIN_EVM_MNEMONIC") {
            self.signing.evm_mnemonic = Some(phrase);
        }
        if let Some(path) = lookup("OMNICHAIN_EVM_DERIVATION_PATH") {
            self.signing.evm_derivation_path = Some(path);
        }
        if let Some(key) = lookup("OMNICHAIN_ALT_PRIVATE_KEY") {
            self.signing.alt_private_key = Some(key);
        }

        // Chains
        if let Some(chain) = lookup("OMNICHAIN_DEFAULT_CHAIN") {
            self.default_chain = chain;
        }
        if let Some(chain) = lookup("OMNICHAIN_ALT_CHAIN") {
            self.alt_chain = chain;
        }
        if let Some(commitment) = lookup("OMNICHAIN_ALT_COMMITMENT")
            && let Ok(c) = commitment.parse()
        {
            self.alt_commitment = c;
        }

        // Logging configuration
        if let Some(level) = lookup("OMNICHAIN_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(format) = lookup("OMNICHAIN_LOG_FORMAT") {
            self.log.format = match format.to_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                _ => LogFormat::Json,
            };
        }

        // Retry
        if let Some(attempts) = lookup("OMNICHAIN_MAX_ATTEMPTS")
            && let Ok(n) = attempts.parse()
        {
            self.retry.max_attempts = n;
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.log.level.trim();
        let is_directive = level.contains('=') || level.contains(',');
        if is_directive {
            EnvFilter::try_new(level).map_err(|e| {
                ConfigError::invalid("log.level", format!("invalid filter '{level}': {e}"))
            })?;
        } else if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "log.level",
                format!(
                    "invalid log level '{}', must be one of {:?} or a filter directive",
                    self.log.level, valid_levels
                ),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::invalid(
                "retry.jitter_factor",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.retry.step_ms > self.retry.max_delay_ms {
            return Err(ConfigError::invalid(
                "retry.step_ms",
                format!("exceeds retry.max_delay_ms ({})", self.retry.max_delay_ms),
            ));
        }

        if self.batch.concurrency == 0 {
            return Err(ConfigError::invalid("batch.concurrency", "must be at least 1"));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "confirmation_timeout_secs",
                "must be positive",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Default Value Functions
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_confirmation_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_chain() -> String {
    "ETHEREUM".to_string()
}

fn default_alt_chain() -> String {
    "SOLANA".to_string()
}
