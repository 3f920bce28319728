//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering process-level failure modes.
///
/// Protocol failures never travel as `AppError`; the dispatcher turns them
/// into JSON-RPC error objects instead.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Tool registry could not be assembled (duplicate or empty names).
    Registry(String),
    /// MCP protocol failure outside a request/response cycle.
    Mcp(String),
    /// HTTP/SSE transport failure (bind, serve, write).
    Transport(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::Mcp(msg) => write!(f, "mcp: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
