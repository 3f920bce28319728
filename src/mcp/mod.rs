//! Model Context Protocol server layer.
//!
//! Layered bottom-up: the JSON-RPC codec, MCP payload types, the tool
//! registry and the built-in CRM tools registered into it, the method
//! dispatcher, then the SSE transport and the HTTP front door that exposes
//! it.

pub mod context;
pub mod dispatcher;
pub mod http;
pub mod jsonrpc;
pub mod registry;
pub mod sse;
pub mod tools;
pub mod types;

/// Protocol version the server prefers and advertises.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
