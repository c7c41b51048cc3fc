//! Configuration loading.
//!
//! Layers, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. `~/.voucherd/config.json` (or an explicit path)
//! 3. `VOUCHERD_*` environment variables (a `.env` file is honoured by the binary)
//!
//! Every section is `#[serde(default)]`, so a partial file only overrides the
//! fields it names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::config::ServerConfig;
use crate::error::{Result, VoucherError};

/// Upper bound for `generation.attempt_timeout_secs` (one day).
pub const MAX_ATTEMPT_TIMEOUT_SECS: u64 = 86_400;

/// External generation service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL; requests go to `{base_url}/api/generate`.
    pub base_url: String,
    pub model: String,
    /// Retries after the first attempt.
    pub retry_limit: u32,
    /// Time budget for a single attempt.
    pub attempt_timeout_secs: u64,
    /// Largest serialized invoice batch accepted by `submit`.
    pub max_payload_bytes: usize,
}

impl GenerationConfig {
    /// Total calls a job may make: the first attempt plus `retry_limit`.
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            retry_limit: 3,
            attempt_timeout_secs: 30,
            max_payload_bytes: 256 * 1024,
        }
    }
}

/// Job cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of resident jobs before LRU eviction.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Default config file location: `~/.voucherd/config.json`.
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".voucherd")
            .join("config.json")
    }

    /// Load from the default path with environment overrides applied.
    pub fn load() -> Result<Self> {
        Self::load_with_env(&Self::path())
    }

    /// Load from `path` with environment overrides applied.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file. A missing file yields defaults; a corrupt one is an error.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).map_err(|e| {
                VoucherError::Config(format!("invalid config file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(VoucherError::Io(e)),
        }
    }

    /// Apply `VOUCHERD_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VOUCHERD_BASE_URL") {
            self.generation.base_url = v;
        }
        if let Some(v) = lookup("VOUCHERD_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("VOUCHERD_RETRY_LIMIT") {
            self.generation.retry_limit = parse_env("VOUCHERD_RETRY_LIMIT", &v)?;
        }
        if let Some(v) = lookup("VOUCHERD_ATTEMPT_TIMEOUT_SECS") {
            self.generation.attempt_timeout_secs = parse_env("VOUCHERD_ATTEMPT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("VOUCHERD_MAX_PAYLOAD_BYTES") {
            self.generation.max_payload_bytes = parse_env("VOUCHERD_MAX_PAYLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("VOUCHERD_CACHE_CAPACITY") {
            self.cache.capacity = parse_env("VOUCHERD_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("VOUCHERD_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("VOUCHERD_PORT") {
            self.server.port = parse_env("VOUCHERD_PORT", &v)?;
        }
        if let Some(v) = lookup("VOUCHERD_LOG_FORMAT") {
            self.logging.format = match v.to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(VoucherError::Config(format!(
                        "VOUCHERD_LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
                    )))
                }
            };
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.generation.base_url.trim().is_empty() {
            return Err(VoucherError::Config("generation.base_url is empty".into()));
        }
        if self.generation.model.trim().is_empty() {
            return Err(VoucherError::Config("generation.model is empty".into()));
        }
        if self.generation.attempt_timeout_secs == 0 {
            return Err(VoucherError::Config(
                "generation.attempt_timeout_secs must be > 0".into(),
            ));
        }
        if self.generation.attempt_timeout_secs > MAX_ATTEMPT_TIMEOUT_SECS {
            return Err(VoucherError::Config(format!(
                "generation.attempt_timeout_secs must be <= {MAX_ATTEMPT_TIMEOUT_SECS}"
            )));
        }
        if self.generation.max_payload_bytes == 0 {
            return Err(VoucherError::Config(
                "generation.max_payload_bytes must be > 0".into(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(VoucherError::Config("cache.capacity must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| VoucherError::Config(format!("{name} has invalid value '{value}'")))
}
