//! Shared test helpers for HTTP-level integration tests.
//!
//! Provides a live server on an ephemeral port plus an SSE record reader
//! over `reqwest` responses, so individual test modules can focus on
//! behaviour rather than boilerplate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ghl_mcp_server::mcp::context::ToolContext;
use ghl_mcp_server::mcp::dispatcher::Dispatcher;
use ghl_mcp_server::mcp::http::{serve_on, AppState};
use ghl_mcp_server::mcp::registry::{ToolError, ToolFuture, ToolProvider, ToolRegistry};
use ghl_mcp_server::mcp::sse::SseSettings;
use ghl_mcp_server::mcp::tools::builtin_providers;
use ghl_mcp_server::mcp::types::{Content, Tool};
use ghl_mcp_server::GlobalConfig;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Timers short enough for tests: 100 ms heartbeat, 600 ms lifetime.
pub fn fast_settings() -> SseSettings {
    SseSettings {
        heartbeat_interval: Duration::from_millis(100),
        max_lifetime: Duration::from_millis(600),
        post_flush_delay: Duration::from_millis(10),
    }
}

/// Tools used to exercise failure and cancellation paths.
///
/// - `failing` returns a handler error.
/// - `stalled` hands its cancellation token to a watcher task and never
///   finishes; the watcher flips `observed_cancel` once the token fires.
#[derive(Default)]
pub struct TestTools {
    pub observed_cancel: Arc<AtomicBool>,
}

impl ToolProvider for TestTools {
    fn describe(&self) -> Vec<Tool> {
        vec![
            Tool::new("failing", "always fails", json!({ "type": "object" })),
            Tool::new("stalled", "never finishes", json!({ "type": "object" })),
        ]
    }

    fn invoke<'a>(
        &'a self,
        name: &'a str,
        _arguments: Value,
        context: ToolContext,
    ) -> ToolFuture<'a> {
        let observed = Arc::clone(&self.observed_cancel);
        Box::pin(async move {
            if name == "failing" {
                return Err(ToolError::new("crm backend unavailable"));
            }
            let token = context.cancel.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                observed.store(true, Ordering::SeqCst);
            });
            std::future::pending::<()>().await;
            Ok(vec![Content::text("unreachable")])
        })
    }
}

/// A running server and the handles needed to drive it.
pub struct TestServer {
    pub base_url: String,
    pub ct: CancellationToken,
    pub handle: JoinHandle<ghl_mcp_server::Result<()>>,
    pub observed_cancel: Arc<AtomicBool>,
}

impl TestServer {
    /// URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Build application state over the built-in tools plus [`TestTools`].
pub fn test_state(settings: SseSettings) -> (Arc<AppState>, Arc<AtomicBool>) {
    let tools = TestTools::default();
    let observed = Arc::clone(&tools.observed_cancel);

    let mut providers = builtin_providers();
    providers.push(Arc::new(tools));
    let registry = ToolRegistry::load(providers).expect("registry");

    let config = GlobalConfig::default();
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        config.server_info(),
        config.protocol_version.clone(),
    );
    let state = AppState {
        dispatcher,
        settings,
        max_body_bytes: 4096,
    };
    (Arc::new(state), observed)
}

/// Spawn the server on an ephemeral port.
///
/// Caller must cancel `ct` to shut the server down.
pub async fn spawn_server(settings: SseSettings) -> TestServer {
    let (state, observed_cancel) = test_state(settings);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");

    let ct = CancellationToken::new();
    let handle = tokio::spawn(serve_on(listener, state, ct.clone()));

    TestServer {
        base_url: format!("http://{addr}"),
        ct,
        handle,
        observed_cancel,
    }
}

/// POST `body` to `/sse`.
pub async fn post_sse(server: &TestServer, body: impl Into<reqwest::Body>) -> reqwest::Response {
    reqwest::Client::new()
        .post(server.url("/sse"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("post /sse")
}

/// Incremental reader of `data: ...\n\n` records from a streaming response.
pub struct SseReader {
    response: reqwest::Response,
    buffer: Vec<u8>,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: Vec::new(),
        }
    }

    /// Next complete record, without its trailing blank line, or `None`
    /// once the server ends the stream.
    pub async fn next_record(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
                let record: Vec<u8> = self.buffer.drain(..pos + 2).collect();
                let text = String::from_utf8(record[..pos].to_vec()).expect("utf8 record");
                return Some(text);
            }
            match self.response.chunk().await.expect("read chunk") {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => return None,
            }
        }
    }

    /// Next record decoded as JSON, with a deadline.
    pub async fn next_json(&mut self, deadline: Duration) -> Option<Value> {
        let record = tokio::time::timeout(deadline, self.next_record())
            .await
            .expect("record before deadline")?;
        let payload = record.strip_prefix("data: ").expect("data field");
        Some(serde_json::from_str(payload).expect("json payload"))
    }
}
