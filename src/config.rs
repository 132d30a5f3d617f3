use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::error::{LimitError, LimitResult};
use crate::rate::RateSpec;

pub const DEFAULT_ZONE: &str = "limit_req";
pub const DEFAULT_RATE: &str = "1r/s";

/// Service configuration, read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Default rule applied when a request carries no overrides
    #[serde(flatten)]
    #[validate(nested)]
    pub rule: LimitRule,

    /// Severity of fail-open diagnostics
    #[serde(default)]
    pub log_level: LogLevel,

    #[validate(nested)]
    pub store: StoreConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> LimitResult<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading limiter configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> LimitResult<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| LimitError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Per-request limiting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LimitRule {
    #[serde(default = "default_zone")]
    #[validate(length(min = 1))]
    pub zone: String,

    /// Fixed key; the caller address is used when unset
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default = "default_rate")]
    pub rate: String,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub burst: f64,

    /// Forbidden window in seconds, 0 disables forbidding
    #[serde(default)]
    pub interval: u64,
}

impl Default for LimitRule {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            key: None,
            rate: default_rate(),
            burst: 0.0,
            interval: 0,
        }
    }
}

impl LimitRule {
    pub fn rate_spec(&self) -> RateSpec {
        RateSpec::new(&self.rate, self.burst, self.interval)
    }

    /// Resolve the limited identity, falling back to the caller address.
    pub fn resolve_key<'a>(&'a self, remote_addr: &'a str) -> &'a str {
        match self.key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => remote_addr,
        }
    }
}

fn default_zone() -> String {
    DEFAULT_ZONE.to_string()
}

fn default_rate() -> String {
    DEFAULT_RATE.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    #[validate(nested)]
    pub reader: Endpoint,

    #[validate(length(min = 1, message = "at least one writer is required"), nested)]
    pub writers: Vec<Endpoint>,
}

/// A single Redis replica.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Endpoint {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Unix socket; takes precedence over host and port
    #[serde(default)]
    pub socket_path: Option<String>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    #[validate(custom(function = validate_timeout))]
    pub timeout: Duration,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default)]
    pub db: i64,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            socket_path: None,
            timeout: default_timeout(),
            password: None,
            db: 0,
        }
    }
}

impl Endpoint {
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    /// Human readable name used in logs.
    pub fn label(&self) -> String {
        match &self.socket_path {
            Some(path) => format!("unix:{}", path),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn connection_info(&self) -> LimitResult<redis::ConnectionInfo> {
        let addr = match &self.socket_path {
            #[cfg(unix)]
            Some(path) => redis::ConnectionAddr::Unix(path.into()),
            #[cfg(not(unix))]
            Some(_) => {
                return Err(LimitError::Config(
                    "unix sockets are not supported on this platform".to_string(),
                ))
            }
            None => redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
        };

        Ok(redis::ConnectionInfo {
            addr,
            redis: redis::RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..Default::default()
            },
        })
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_timeout() -> Duration {
    Duration::from_secs(1)
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if timeout.is_zero() {
        return Err(ValidationError::new("timeout_must_be_positive"));
    }
    Ok(())
}
