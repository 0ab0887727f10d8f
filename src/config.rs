//! Server configuration.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Command line**: flags passed to the `textws` binary
//! 2. **Environment variables**: values from `TEXTWS_*` env vars
//! 3. **Config file**: values loaded from a TOML file
//! 4. **Defaults**: built-in defaults from [`ServerConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `TEXTWS_BIND` | `SocketAddr` | `bind` |
//! | `TEXTWS_GREETING` | `String` (empty disables) | `greeting` |
//! | `TEXTWS_MAX_PAYLOAD` | `usize` | `max_payload_size` |
//! | `TEXTWS_IDLE_TIMEOUT_SECS` | `u64` (0 disables) | `idle_timeout` |
//! | `TEXTWS_CLOSE_TIMEOUT_SECS` | `u64` | `close_timeout` |
//! | `TEXTWS_ALLOWED_ORIGIN` | `String` | `allowed_origin` |
//! | `TEXTWS_ECHO` | `bool` | `echo` |
//! | `TEXTWS_MAX_CONNECTIONS` | `usize` (0 is unlimited) | `max_connections` |

use crate::net::websocket::{ConnectionConfig, FrameCodec, DEFAULT_GREETING};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable name for the listen address.
pub const ENV_BIND: &str = "TEXTWS_BIND";
/// Environment variable name for the greeting text.
pub const ENV_GREETING: &str = "TEXTWS_GREETING";
/// Environment variable name for the maximum frame payload size.
pub const ENV_MAX_PAYLOAD: &str = "TEXTWS_MAX_PAYLOAD";
/// Environment variable name for the idle timeout in seconds.
pub const ENV_IDLE_TIMEOUT_SECS: &str = "TEXTWS_IDLE_TIMEOUT_SECS";
/// Environment variable name for the close handshake timeout in seconds.
pub const ENV_CLOSE_TIMEOUT_SECS: &str = "TEXTWS_CLOSE_TIMEOUT_SECS";
/// Environment variable name for the CORS origin of the plain HTTP route.
pub const ENV_ALLOWED_ORIGIN: &str = "TEXTWS_ALLOWED_ORIGIN";
/// Environment variable name for echo mode.
pub const ENV_ECHO: &str = "TEXTWS_ECHO";
/// Environment variable name for the connection limit.
pub const ENV_MAX_CONNECTIONS: &str = "TEXTWS_MAX_CONNECTIONS";

/// Default listen address.
pub const DEFAULT_BIND: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 4000);
/// Default origin allowed to read the plain HTTP route.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that does not parse.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// What the variable should contain.
        expected: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config file holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for [`Server`](crate::server::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Text frame sent to each client after the upgrade.
    pub greeting: Option<String>,
    /// Largest accepted frame payload in bytes.
    pub max_payload_size: usize,
    /// Close connections that stay silent this long.
    pub idle_timeout: Option<Duration>,
    /// How long a server-initiated close waits for the client's reply.
    pub close_timeout: Duration,
    /// Value of `Access-Control-Allow-Origin` on the plain HTTP route.
    pub allowed_origin: String,
    /// Reply to every text frame with the same text.
    pub echo: bool,
    /// Upper bound for the HTTP request head.
    pub max_header_bytes: usize,
    /// Connection limit. `None` means unlimited.
    pub max_connections: Option<usize>,
    /// How long shutdown waits for open connections before aborting them.
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND,
            greeting: Some(DEFAULT_GREETING.to_string()),
            max_payload_size: FrameCodec::DEFAULT_MAX_PAYLOAD_SIZE,
            idle_timeout: None,
            close_timeout: Duration::from_secs(5),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            echo: false,
            max_header_bytes: 8 * 1024,
            max_connections: None,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults, then the optional TOML file, then environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = path {
            let file = parse_toml_file(path)?;
            config.apply_toml(&file)?;
        }
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Set the listen address.
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind = addr;
        self
    }

    /// Set the greeting text.
    #[must_use]
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Send no greeting.
    #[must_use]
    pub fn no_greeting(mut self) -> Self {
        self.greeting = None;
        self
    }

    /// Set the maximum frame payload size.
    #[must_use]
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the close handshake timeout.
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the CORS origin of the plain HTTP route.
    #[must_use]
    pub fn allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = origin.into();
        self
    }

    /// Enable or disable echo mode.
    #[must_use]
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set the upper bound for the HTTP request head.
    #[must_use]
    pub fn max_header_bytes(mut self, size: usize) -> Self {
        self.max_header_bytes = size;
        self
    }

    /// Set the connection limit.
    #[must_use]
    pub fn max_connections(mut self, max: Option<usize>) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the shutdown drain timeout.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Per-connection settings derived from this configuration.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            greeting: self.greeting.clone(),
            max_payload_size: self.max_payload_size,
            idle_timeout: self.idle_timeout,
            close_timeout: self.close_timeout,
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Only variables that are set in the environment are applied.
    /// Returns an error if a variable is set but contains an unparseable value.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(val) = read_env(ENV_BIND) {
            self.bind = parse_addr(ENV_BIND, &val)?;
        }
        if let Some(val) = read_env(ENV_GREETING) {
            self.greeting = Some(val).filter(|text| !text.is_empty());
        }
        if let Some(val) = read_env(ENV_MAX_PAYLOAD) {
            self.max_payload_size = parse_usize(ENV_MAX_PAYLOAD, &val)?;
        }
        if let Some(val) = read_env(ENV_IDLE_TIMEOUT_SECS) {
            self.idle_timeout = secs_or_disabled(parse_u64(ENV_IDLE_TIMEOUT_SECS, &val)?);
        }
        if let Some(val) = read_env(ENV_CLOSE_TIMEOUT_SECS) {
            self.close_timeout = Duration::from_secs(parse_u64(ENV_CLOSE_TIMEOUT_SECS, &val)?);
        }
        if let Some(val) = read_env(ENV_ALLOWED_ORIGIN) {
            self.allowed_origin = val;
        }
        if let Some(val) = read_env(ENV_ECHO) {
            self.echo = parse_bool(ENV_ECHO, &val)?;
        }
        if let Some(val) = read_env(ENV_MAX_CONNECTIONS) {
            let max = parse_usize(ENV_MAX_CONNECTIONS, &val)?;
            self.max_connections = Some(max).filter(|max| *max > 0);
        }
        Ok(())
    }

    /// Apply values from a parsed config file.
    pub fn apply_toml(&mut self, toml: &TomlConfig) -> Result<(), ConfigError> {
        if let Some(ref bind) = toml.bind {
            self.bind = bind
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("bind address {bind:?}")))?;
        }
        if let Some(ref greeting) = toml.greeting {
            self.greeting = Some(greeting.clone()).filter(|text| !text.is_empty());
        }
        if let Some(ref origin) = toml.allowed_origin {
            self.allowed_origin.clone_from(origin);
        }
        if let Some(echo) = toml.echo {
            self.echo = echo;
        }
        if let Some(v) = toml.limits.max_payload_size {
            self.max_payload_size = v;
        }
        if let Some(v) = toml.limits.max_header_bytes {
            self.max_header_bytes = v;
        }
        if let Some(v) = toml.limits.max_connections {
            self.max_connections = Some(v).filter(|max| *max > 0);
        }
        if let Some(v) = toml.timeouts.idle_secs {
            self.idle_timeout = secs_or_disabled(v);
        }
        if let Some(v) = toml.timeouts.close_secs {
            self.close_timeout = Duration::from_secs(v);
        }
        if let Some(v) = toml.timeouts.drain_secs {
            self.drain_timeout = Duration::from_secs(v);
        }
        Ok(())
    }
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn secs_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn invalid(var: &'static str, expected: &'static str, val: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var,
        expected,
        value: val.to_string(),
    }
}

fn parse_addr(var: &'static str, val: &str) -> Result<SocketAddr, ConfigError> {
    val.trim()
        .parse()
        .map_err(|_| invalid(var, "socket address", val))
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse()
        .map_err(|_| invalid(var, "unsigned integer", val))
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse()
        .map_err(|_| invalid(var, "unsigned integer", val))
}

fn parse_bool(var: &'static str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, "bool (true/false/1/0/yes/no)", val)),
    }
}

/// TOML-deserializable server configuration.
///
/// ```toml
/// bind = "127.0.0.1:4000"
/// greeting = "welcome"
/// allowed_origin = "https://example.com"
/// echo = true
///
/// [limits]
/// max_payload_size = 65536
/// max_header_bytes = 8192
/// max_connections = 1024
///
/// [timeouts]
/// idle_secs = 300
/// close_secs = 5
/// drain_secs = 10
/// ```
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Listen address.
    pub bind: Option<String>,
    /// Greeting text; empty disables it.
    pub greeting: Option<String>,
    /// CORS origin of the plain HTTP route.
    pub allowed_origin: Option<String>,
    /// Echo mode.
    pub echo: Option<bool>,
    /// Size limits.
    #[serde(default)]
    pub limits: LimitsToml,
    /// Timeouts in seconds.
    #[serde(default)]
    pub timeouts: TimeoutsToml,
}

/// `[limits]` table.
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct LimitsToml {
    /// Largest accepted frame payload in bytes.
    pub max_payload_size: Option<usize>,
    /// Upper bound for the HTTP request head.
    pub max_header_bytes: Option<usize>,
    /// Connection limit; 0 is unlimited.
    pub max_connections: Option<usize>,
}

/// `[timeouts]` table.
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsToml {
    /// Idle timeout; 0 disables it.
    pub idle_secs: Option<u64>,
    /// Close handshake timeout.
    pub close_secs: Option<u64>,
    /// Shutdown drain timeout.
    pub drain_secs: Option<u64>,
}

/// Parse a TOML string into a [`TomlConfig`].
pub fn parse_toml_str(toml_str: &str) -> Result<TomlConfig, ConfigError> {
    Ok(toml::from_str(toml_str)?)
}

/// Read and parse a TOML file into a [`TomlConfig`].
pub fn parse_toml_file(path: &Path) -> Result<TomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml_str(&content)
}
