//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::mcp::sse::SseSettings;
use crate::mcp::types::ServerInfo;
use crate::{AppError, Result};

/// Environment variable that overrides [`GlobalConfig::http_port`].
pub const PORT_ENV: &str = "PORT";

/// Largest accepted `max_connection_seconds` (one day). Also bounds the
/// heartbeat, which must be shorter.
pub const MAX_CONNECTION_SECONDS_LIMIT: u64 = 86_400;

/// Largest accepted `post_flush_delay_ms`.
pub const MAX_POST_FLUSH_DELAY_MS: u64 = 60_000;

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_http_port() -> u16 {
    10000
}

fn default_server_name() -> String {
    "ghl-mcp-server".into()
}

fn default_server_version() -> String {
    "1.0.0".into()
}

fn default_protocol_version() -> String {
    crate::mcp::PROTOCOL_VERSION.into()
}

fn default_heartbeat_interval_seconds() -> u64 {
    15
}

fn default_max_connection_seconds() -> u64 {
    50
}

fn default_post_flush_delay_ms() -> u64 {
    100
}

fn default_max_body_bytes() -> usize {
    1_048_576
}

/// Global configuration parsed from an optional `config.toml`.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct GlobalConfig {
    /// Interface the HTTP listener binds to.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// HTTP port for the SSE transport.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Server name advertised in `initialize` and `/health`.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Server version advertised in `initialize` and `/health`.
    #[serde(default = "default_server_version")]
    pub server_version: String,
    /// Preferred MCP protocol version.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Seconds between `ping` notifications on an open SSE stream.
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
    /// Hard ceiling on the lifetime of one SSE stream.
    #[serde(default = "default_max_connection_seconds")]
    pub max_connection_seconds: u64,
    /// Delay before a POST response stream is ended after its single frame.
    #[serde(default = "default_post_flush_delay_ms")]
    pub post_flush_delay_ms: u64,
    /// Largest accepted POST body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            server_name: default_server_name(),
            server_version: default_server_version(),
            protocol_version: default_protocol_version(),
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
            max_connection_seconds: default_max_connection_seconds(),
            post_flush_delay_ms: default_post_flush_delay_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// Only [`PORT_ENV`] is consulted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `PORT` is set but is not a valid port.
    pub fn apply_env(&mut self) -> Result<()> {
        match env::var(PORT_ENV) {
            Ok(raw) => self.apply_port_override(&raw),
            Err(env::VarError::NotPresent) => Ok(()),
            Err(err) => {
                warn!(%err, "ignoring unreadable {PORT_ENV}");
                Ok(())
            }
        }
    }

    /// Replace `http_port` with the parsed value of `raw`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `raw` is not a `u16`.
    pub fn apply_port_override(&mut self, raw: &str) -> Result<()> {
        let port = raw
            .trim()
            .parse::<u16>()
            .map_err(|err| AppError::Config(format!("invalid {PORT_ENV} value {raw:?}: {err}")))?;
        debug!(port, "http port overridden");
        self.http_port = port;
        Ok(())
    }

    /// Socket address the HTTP listener binds to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.http_port)
    }

    /// Server identity advertised to clients.
    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server_name.clone(),
            version: self.server_version.clone(),
        }
    }

    /// Timer settings for SSE connections.
    #[must_use]
    pub fn sse_settings(&self) -> SseSettings {
        SseSettings {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_seconds),
            max_lifetime: Duration::from_secs(self.max_connection_seconds),
            post_flush_delay: Duration::from_millis(self.post_flush_delay_ms),
        }
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(AppError::Config(
                "heartbeat_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.max_connection_seconds == 0 {
            return Err(AppError::Config(
                "max_connection_seconds must be greater than zero".into(),
            ));
        }

        if self.max_connection_seconds > MAX_CONNECTION_SECONDS_LIMIT {
            return Err(AppError::Config(format!(
                "max_connection_seconds must not exceed {MAX_CONNECTION_SECONDS_LIMIT}"
            )));
        }

        if self.heartbeat_interval_seconds >= self.max_connection_seconds {
            return Err(AppError::Config(
                "heartbeat_interval_seconds must be shorter than max_connection_seconds".into(),
            ));
        }

        if self.post_flush_delay_ms > MAX_POST_FLUSH_DELAY_MS {
            return Err(AppError::Config(format!(
                "post_flush_delay_ms must not exceed {MAX_POST_FLUSH_DELAY_MS}"
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(AppError::Config(
                "max_body_bytes must be greater than zero".into(),
            ));
        }

        if self.server_name.trim().is_empty() {
            return Err(AppError::Config("server_name must not be empty".into()));
        }

        Ok(())
    }
}
