//! Method dispatcher: one inbound message in, at most one Response out.
//!
//! The dispatcher is stateless between calls. Everything it needs lives in
//! the shared [`ToolRegistry`] and the static server identity, so a single
//! instance serves every connection concurrently.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::mcp::context::ToolContext;
use crate::mcp::jsonrpc::{
    build_response, parse_message, JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse,
};
use crate::mcp::registry::{ToolError, ToolRegistry};
use crate::mcp::types::{
    CallToolParams, CallToolResult, InitializeResult, ListToolsResult, ServerCapabilities,
    ServerInfo,
};

/// Protocol versions a client may request and get echoed back.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Routes JSON-RPC methods to their handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    server_info: ServerInfo,
    protocol_version: String,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        server_info: ServerInfo,
        protocol_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            server_info,
            protocol_version: protocol_version.into(),
        }
    }

    /// Shared tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Static server identity.
    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Preferred protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Current catalog snapshot, as sent by `tools/list`.
    #[must_use]
    pub fn catalog(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.registry.list().to_vec(),
        }
    }

    /// Decode `raw` and dispatch it.
    ///
    /// Returns `None` when the message expects no Response (a notification or
    /// a client-side response). Decode failures always produce a Response.
    pub async fn handle_bytes(
        &self,
        raw: &[u8],
        cancel: CancellationToken,
    ) -> Option<JsonRpcResponse> {
        match parse_message(raw) {
            Ok(message) => self.dispatch(message, cancel).await,
            Err(err) => {
                warn!(code = err.code().code(), %err, "rejected inbound message");
                Some(err.into_response())
            }
        }
    }

    /// Dispatch a decoded message.
    pub async fn dispatch(
        &self,
        message: JsonRpcMessage,
        cancel: CancellationToken,
    ) -> Option<JsonRpcResponse> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request, cancel).await),
            JsonRpcMessage::Notification(notification) => {
                Self::handle_notification(&notification);
                None
            }
            JsonRpcMessage::Response(response) => {
                debug!(id = %response.id, "ignoring client response");
                None
            }
        }
    }

    /// Handle one request. Never panics; dispatcher faults become -32603.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        cancel: CancellationToken,
    ) -> JsonRpcResponse {
        let id = request.id.clone();
        let span = info_span!("dispatch", method = %request.method, id = %request.id);

        guarded(id, self.route(request, cancel))
            .instrument(span)
            .await
    }

    async fn route(
        &self,
        request: JsonRpcRequest,
        cancel: CancellationToken,
    ) -> Result<Value, JsonRpcError> {
        info!("handling request");
        match request.method.as_str() {
            "initialize" => self.initialize(request.params.as_ref()),
            "tools/list" => to_result(&self.catalog()),
            "tools/call" => self.call_tool(request.id, request.params, cancel).await,
            "ping" => Ok(Value::Object(Map::new())),
            other => {
                warn!(method = other, "method not found");
                Err(JsonRpcError::method_not_found(other))
            }
        }
    }

    fn initialize(&self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let client = params
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        let negotiated = self.negotiate(requested);
        info!(
            client,
            requested = requested.unwrap_or("none"),
            negotiated,
            "initialize"
        );

        to_result(&InitializeResult {
            protocol_version: negotiated.to_owned(),
            capabilities: ServerCapabilities::default(),
            server_info: self.server_info.clone(),
        })
    }

    fn negotiate<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(version)
                if version == self.protocol_version
                    || SUPPORTED_PROTOCOL_VERSIONS.contains(&version) =>
            {
                version
            }
            _ => &self.protocol_version,
        }
    }

    async fn call_tool(
        &self,
        id: JsonRpcId,
        params: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = match params {
            Some(value @ Value::Object(_)) => serde_json::from_value(value)
                .map_err(|err| JsonRpcError::invalid_params(&err.to_string()))?,
            _ => {
                return Err(JsonRpcError::invalid_params(
                    "tools/call requires an object with a string name",
                ));
            }
        };

        let Some(handle) = self.registry.find(&params.name) else {
            warn!(tool = %params.name, "unknown tool");
            return Err(JsonRpcError::method_not_found(&params.name));
        };

        let arguments = params
            .arguments
            .unwrap_or_else(|| Value::Object(Map::new()));
        let context = ToolContext::new(id, cancel.clone());
        // The provider call itself sits inside the guard so a panic raised
        // before any future exists is still a tool failure.
        let invocation = AssertUnwindSafe(async move { handle.invoke(arguments, context).await })
            .catch_unwind();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ToolError::cancelled()),
            result = invocation => result.unwrap_or_else(|panic| {
                Err(ToolError::new(format!(
                    "tool panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }),
        };

        match outcome {
            Ok(content) => {
                info!(tool = %params.name, items = content.len(), "tool call succeeded");
                to_result(&CallToolResult { content })
            }
            Err(err) => {
                warn!(tool = %params.name, error = %err, "tool call failed");
                Err(JsonRpcError::tool_execution(err.message()))
            }
        }
    }

    fn handle_notification(notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" | "notification/initialized" => {
                info!(method = %notification.method, "client initialized");
            }
            other => debug!(method = other, "ignoring notification"),
        }
    }
}

/// Await `route`, turning a panic anywhere in it into a -32603 Response.
async fn guarded<F>(id: JsonRpcId, route: F) -> JsonRpcResponse
where
    F: Future<Output = Result<Value, JsonRpcError>>,
{
    match AssertUnwindSafe(route).catch_unwind().await {
        Ok(result) => build_response(id, result),
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            error!(%id, %detail, "dispatcher panicked");
            build_response(id, Err(JsonRpcError::internal_error(detail)))
        }
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|err| JsonRpcError::internal_error(err.to_string()))
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_owned()
    }
}
