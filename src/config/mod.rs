use crate::error::{RateLimiterError, Result};
use crate::rate_limit::types::LimiterConfig;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `RATELIMITER__RATE_LIMIT__IP_LIMIT`
pub const ENV_PREFIX: &str = "RATELIMITER";

/// Longest accepted block duration (one year)
pub const MAX_BLOCK_SECS: u64 = 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Limits and block durations
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Counter store selection
    #[serde(default)]
    pub storage: StorageConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Per-kind limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests per second allowed for an address
    #[serde(default = "default_ip_limit")]
    pub ip_limit: u64,
    /// Block duration for an address, in seconds
    #[serde(default = "default_block_secs")]
    pub ip_block_secs: u64,
    /// Requests per second allowed for a credential
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,
    /// Block duration for a credential, in seconds
    #[serde(default = "default_block_secs")]
    pub token_block_secs: u64,
    /// Header carrying the API credential
    #[serde(default = "default_credential_header")]
    pub credential_header: String,
}

/// Counter store backend selector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
}

/// Counter store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Seconds between sweeps of the in-memory store; 0 disables the sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    /// Timeout for connecting and for each command, in milliseconds
    #[serde(default = "default_redis_timeout")]
    pub timeout_ms: u64,
    /// Prefix for every key this service writes
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics on `/metrics`
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ip_limit() -> u64 {
    5
}

fn default_token_limit() -> u64 {
    10
}

fn default_block_secs() -> u64 {
    300
}

fn default_credential_header() -> String {
    "API_KEY".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_timeout() -> u64 {
    1000
}

fn default_key_prefix() -> String {
    "ratelimiter:".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            ip_limit: default_ip_limit(),
            ip_block_secs: default_block_secs(),
            token_limit: default_token_limit(),
            token_block_secs: default_block_secs(),
            credential_header: default_credential_header(),
        }
    }
}

impl RateLimitSettings {
    /// Limits in the form the decision engine takes
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            ip_limit: self.ip_limit,
            ip_block_duration: Duration::from_secs(self.ip_block_secs),
            token_limit: self.token_limit,
            token_block_duration: Duration::from_secs(self.token_block_secs),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sweep_interval_secs: default_sweep_interval(),
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            timeout_ms: default_redis_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional YAML file, overridden by
    /// `RATELIMITER__*` environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(
                File::from(path)
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|e| {
            RateLimiterError::Config(format!(
                "Failed to load config from {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RateLimiterError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateLimiterError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let limits = &self.rate_limit;

        if limits.ip_limit == 0 {
            return Err(RateLimiterError::Config(
                "rate_limit.ip_limit must be > 0".to_string(),
            ));
        }
        if limits.token_limit == 0 {
            return Err(RateLimiterError::Config(
                "rate_limit.token_limit must be > 0".to_string(),
            ));
        }
        if limits.ip_block_secs == 0 || limits.token_block_secs == 0 {
            return Err(RateLimiterError::Config(
                "Block durations must be > 0".to_string(),
            ));
        }
        if limits.ip_block_secs > MAX_BLOCK_SECS || limits.token_block_secs > MAX_BLOCK_SECS {
            return Err(RateLimiterError::Config(format!(
                "Block durations must be <= {} seconds",
                MAX_BLOCK_SECS
            )));
        }
        if limits.credential_header.trim().is_empty()
            || http::HeaderName::from_bytes(limits.credential_header.as_bytes()).is_err()
        {
            return Err(RateLimiterError::Config(format!(
                "Invalid credential header name: '{}'",
                limits.credential_header
            )));
        }

        if self.storage.backend == StorageBackend::Redis {
            let redis = &self.storage.redis;
            if redis.host.is_empty() {
                return Err(RateLimiterError::Config(
                    "storage.redis.host cannot be empty".to_string(),
                ));
            }
            if redis.timeout_ms == 0 {
                return Err(RateLimiterError::Config(
                    "storage.redis.timeout_ms must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
