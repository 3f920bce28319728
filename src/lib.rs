#![forbid(unsafe_code)]

//! MCP tool server speaking JSON-RPC 2.0 over HTTP Server-Sent Events.

pub mod config;
pub mod errors;
pub mod mcp;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
