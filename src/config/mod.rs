//! Configuration Module
//!
//! Provides TOML-based configuration for msghub with support for:
//! - Server settings (HTTP and WebSocket bind addresses, body limit)
//! - Hub parameters (replay buffer, fan-out, write timeout)
//! - Basic-auth users for the share and private scopes
//! - Environment variable overrides (MSGHUB__* prefix)

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::hub::{HubOptions, DEFAULT_MAX_INFLIGHT};
use crate::replay;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}

#[cfg(test)]
mod tests;

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Server configuration
    pub server: ServerConfig,
    /// Hub configuration
    pub hub: HubConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Extra listener for WebSocket only; `/ws` is always served on `bind`
    pub ws_bind: Option<SocketAddr>,
    /// Largest accepted HTTP request body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ws_bind: None,
            max_body_size: default_max_body_size(),
        }
    }
}

/// Hub configuration, applied to every hub the server creates
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Messages retained per topic for HTTP draining
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
    /// Concurrent deliveries across all hubs (0 = unbounded)
    #[serde(default = "default_max_inflight_deliveries")]
    pub max_inflight_deliveries: usize,
    /// Timeout for a single write to a connection
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    pub write_timeout: Duration,
    /// Amount drained when the request does not say
    #[serde(default = "default_drain_amount")]
    pub default_drain_amount: usize,
    /// Topic joined by every new connection ("" disables)
    #[serde(default = "default_global_topic")]
    pub global_topic: String,
}

fn default_replay_capacity() -> usize {
    replay::DEFAULT_CAPACITY
}
fn default_max_inflight_deliveries() -> usize {
    DEFAULT_MAX_INFLIGHT
}
fn default_write_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_drain_amount() -> usize {
    10
}
fn default_global_topic() -> String {
    "global".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            replay_capacity: default_replay_capacity(),
            max_inflight_deliveries: default_max_inflight_deliveries(),
            write_timeout: default_write_timeout(),
            default_drain_amount: default_drain_amount(),
            global_topic: default_global_topic(),
        }
    }
}

impl From<&HubConfig> for HubOptions {
    fn from(config: &HubConfig) -> Self {
        HubOptions {
            replay_capacity: config.replay_capacity,
            max_inflight_deliveries: config.max_inflight_deliveries,
            write_timeout: config.write_timeout,
            global_topic: config.global_topic.clone(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Static user list
    pub users: Vec<UserConfig>,
}

/// User configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Username, also the tenant key of the private scope
    pub username: String,
    /// Password (plaintext) - use password_hash for production
    #[serde(default)]
    pub password: Option<String>,
    /// Password hash (argon2 PHC format: $argon2id$v=19$...)
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether `/metrics` is served
    pub enabled: bool,
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `MSGHUB__` prefix with double underscores for nesting:
    ///    - `MSGHUB__SERVER__BIND=0.0.0.0:8081` overrides `server.bind`
    ///    - `MSGHUB__HUB__REPLAY_CAPACITY=500` overrides `hub.replay_capacity`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("server.bind", "0.0.0.0:8080")?
            .set_default("server.max_body_size", default_max_body_size() as u64)?
            .set_default("hub.replay_capacity", replay::DEFAULT_CAPACITY as u64)?
            .set_default("hub.max_inflight_deliveries", DEFAULT_MAX_INFLIGHT as u64)?
            .set_default("hub.write_timeout", "10s")?
            .set_default("hub.default_drain_amount", 10)?
            .set_default("hub.global_topic", "global")?
            .set_default("metrics.enabled", false)?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content)?;
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("MSGHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.replay_capacity == 0 {
            return Err(ConfigError::Validation(
                "hub.replay_capacity must be greater than 0".to_string(),
            ));
        }
        if self.hub.default_drain_amount == 0 {
            return Err(ConfigError::Validation(
                "hub.default_drain_amount must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for user in &self.auth.users {
            if user.username.is_empty() {
                return Err(ConfigError::Validation(
                    "User with empty username".to_string(),
                ));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "User '{}' is defined more than once",
                    user.username
                )));
            }
            match (&user.password, &user.password_hash) {
                (None, None) => {
                    return Err(ConfigError::Validation(format!(
                        "User '{}' must have either 'password' or 'password_hash'",
                        user.username
                    )));
                }
                (Some(_), Some(_)) => {
                    return Err(ConfigError::Validation(format!(
                        "User '{}' cannot have both 'password' and 'password_hash'",
                        user.username
                    )));
                }
                (Some(pwd), None) if pwd.is_empty() => {
                    return Err(ConfigError::Validation(format!(
                        "User '{}' has empty password",
                        user.username
                    )));
                }
                (None, Some(hash)) if !hash.starts_with("$argon2") => {
                    return Err(ConfigError::Validation(format!(
                        "User '{}' has invalid password_hash format (must be argon2 PHC format)",
                        user.username
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Options shared by every hub of the server
    pub fn hub_options(&self) -> HubOptions {
        HubOptions::from(&self.hub)
    }
}
