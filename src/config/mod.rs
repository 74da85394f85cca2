//! Transport configuration.
//!
//! Values come from defaults, then an optional TOML file, then
//! `RASK_TELEMETRY_*` environment variables. Durations are written as
//! millisecond integers (`request_timeout_ms = 10000`).

pub mod serde_helpers;

use crate::reliability::offline_queue::OfflineQueueConfig;
use crate::reliability::retry::{RetryConfig, RetryError};
use crate::sanitizer::SanitizerConfig;
use crate::sender::compression::{
    CompressionFormat, DEFAULT_BATCH_THRESHOLD, DEFAULT_EVENT_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use serde_helpers::{
    EnvLookup, duration_ms, load_env_list, load_env_millis, load_env_path_opt, load_env_string,
    load_env_string_opt, load_env_var,
};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const ENV_PREFIX: &str = "RASK_TELEMETRY_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
    #[error(transparent)]
    Retry(#[from] RetryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub format: CompressionFormat,
    /// Single events at or above this many bytes are compressed.
    pub threshold: usize,
    /// Flushed batches at or above this many bytes are compressed.
    pub batch_threshold: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: CompressionFormat::Gzip,
            threshold: DEFAULT_EVENT_THRESHOLD,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub name: String,
    pub endpoint: String,
    /// Static credential. Async providers are set on the builder instead.
    pub auth_token: Option<String>,
    /// Adds the `Bearer` scheme to bare tokens and scrubs them on close.
    /// When off the token is sent exactly as configured.
    pub enable_secure_token_handling: bool,
    pub rate_limit_per_minute: u32,
    pub retry: RetryConfig,
    pub enable_offline_storage: bool,
    pub offline_queue: OfflineQueueConfig,
    pub compression: CompressionConfig,
    pub sanitizer: SanitizerConfig,
    #[serde(with = "duration_ms", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// Largest body handed to the beacon channel.
    pub beacon_max_bytes: usize,
    /// Queued events per flush request.
    pub batch_size: usize,
    #[serde(with = "duration_ms", rename = "close_timeout_ms")]
    pub close_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: "remote".to_string(),
            endpoint: "http://localhost:9600/v1/telemetry".to_string(),
            auth_token: None,
            enable_secure_token_handling: true,
            rate_limit_per_minute: 100,
            retry: RetryConfig::default(),
            enable_offline_storage: true,
            offline_queue: OfflineQueueConfig::default(),
            compression: CompressionConfig::default(),
            sanitizer: SanitizerConfig::default(),
            request_timeout: Duration::from_secs(10),
            beacon_max_bytes: 64 * 1024,
            batch_size: 50,
            close_timeout: Duration::from_secs(5),
            user_agent: format!("rask-telemetry-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `url` with any `user:password@` part removed, for logs and debug output.
pub fn display_url(url: &Url) -> String {
    let mut shown = url.clone();
    // Both fail only for URLs that cannot carry credentials at all.
    let _ = shown.set_password(None);
    let _ = shown.set_username("");
    shown.to_string()
}

/// Like [`display_url`] for a raw endpoint string. Text that does not parse
/// is never echoed.
pub fn display_endpoint(endpoint: &str) -> String {
    match Url::parse(endpoint) {
        Ok(url) if !url.cannot_be_a_base() => display_url(&url),
        _ => format!("<unparsed, {} chars>", endpoint.chars().count()),
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("name", &self.name)
            .field("endpoint", &display_endpoint(&self.endpoint))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("enable_secure_token_handling", &self.enable_secure_token_handling)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("retry", &self.retry)
            .field("enable_offline_storage", &self.enable_offline_storage)
            .field("offline_queue", &self.offline_queue)
            .field("compression", &self.compression)
            .field("sanitizer", &self.sanitizer)
            .field("request_timeout", &self.request_timeout)
            .field("beacon_max_bytes", &self.beacon_max_bytes)
            .field("batch_size", &self.batch_size)
            .field("close_timeout", &self.close_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl TransportConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(&|name| std::env::var(name).ok())
    }

    pub fn apply_env_from(&mut self, env: EnvLookup<'_>) -> Result<(), ConfigError> {
        let var = |suffix: &str| format!("{ENV_PREFIX}{suffix}");

        load_env_string(env, &var("NAME"), &mut self.name);
        load_env_string(env, &var("ENDPOINT"), &mut self.endpoint);
        load_env_string_opt(env, &var("AUTH_TOKEN"), &mut self.auth_token);
        load_env_var(
            env,
            &var("ENABLE_SECURE_TOKEN_HANDLING"),
            &mut self.enable_secure_token_handling,
        )?;
        load_env_var(env, &var("RATE_LIMIT_PER_MINUTE"), &mut self.rate_limit_per_minute)?;
        load_env_var(env, &var("MAX_RETRIES"), &mut self.retry.max_retries)?;
        load_env_millis(env, &var("BASE_DELAY_MS"), &mut self.retry.base_delay)?;
        load_env_millis(env, &var("MAX_DELAY_MS"), &mut self.retry.max_delay)?;
        load_env_var(env, &var("ENABLE_OFFLINE_STORAGE"), &mut self.enable_offline_storage)?;
        load_env_path_opt(env, &var("OFFLINE_STORAGE_PATH"), &mut self.offline_queue.storage_path);
        load_env_var(env, &var("OFFLINE_MAX_ENTRIES"), &mut self.offline_queue.max_entries)?;
        load_env_var(env, &var("COMPRESSION_ENABLED"), &mut self.compression.enabled)?;
        load_env_var(env, &var("COMPRESSION_FORMAT"), &mut self.compression.format)?;
        load_env_var(env, &var("COMPRESSION_THRESHOLD"), &mut self.compression.threshold)?;
        load_env_var(env, &var("SANITIZER_STRATEGY"), &mut self.sanitizer.strategy)?;
        load_env_list(
            env,
            &var("ADDITIONAL_SENSITIVE_FIELDS"),
            &mut self.sanitizer.additional_sensitive_fields,
        );
        load_env_millis(env, &var("REQUEST_TIMEOUT_MS"), &mut self.request_timeout)?;
        load_env_var(env, &var("BATCH_SIZE"), &mut self.batch_size)?;
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid endpoint URL {}: {}",
                display_endpoint(&self.endpoint),
                e
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::InvalidUrl(format!(
                "Unsupported endpoint scheme '{scheme}'"
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        self.retry.validate()?;

        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Transport name must not be empty".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.offline_queue.max_entries == 0 {
            return Err(ConfigError::InvalidConfig(
                "Offline queue must hold at least one entry".to_string(),
            ));
        }

        if self.enable_offline_storage
            && let Some(path) = &self.offline_queue.storage_path
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Offline storage parent directory does not exist: {}",
                parent.display()
            )));
        }

        Ok(())
    }
}
