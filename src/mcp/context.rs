//! Per-invocation context for tool handlers.
//!
//! Provides [`ToolContext`], the bundle every tool handler receives next to
//! its arguments: the id of the originating request and a cancellation token
//! that fires when that request is abandoned or the server shuts down.

use tokio_util::sync::CancellationToken;

use crate::mcp::jsonrpc::JsonRpcId;

/// Per-request context available to every tool handler.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Id of the `tools/call` request being served.
    pub request_id: JsonRpcId,
    /// Cancelled when the caller goes away or the server stops.
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Construct a new tool context.
    #[must_use]
    pub fn new(request_id: JsonRpcId, cancel: CancellationToken) -> Self {
        Self { request_id, cancel }
    }

    /// Context that is never cancelled, for direct invocation in tests and tooling.
    #[must_use]
    pub fn detached(request_id: JsonRpcId) -> Self {
        Self::new(request_id, CancellationToken::new())
    }

    /// Whether the caller has gone away.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
