//! HTTP front door.
//!
//! Routes health checks, the `/sse` transport and everything else onto an
//! axum [`Router`]. Every response passes through a permissive
//! [`CorsLayer`], a panic guard that converts a crashed handler into a JSON
//! 500, and a shim that answers any `OPTIONS` request with an empty 200.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use super::dispatcher::Dispatcher;
use super::sse::{self, SseSettings};
use super::types::ServerInfo;
use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Path of the MCP endpoint.
pub const SSE_PATH: &str = "/sse";

/// How long browsers may cache a preflight answer.
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Shared state for all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    /// Method dispatcher over the loaded registry.
    pub dispatcher: Dispatcher,
    /// Timer settings for SSE connections.
    pub settings: SseSettings,
    /// Largest accepted `POST` body.
    pub max_body_bytes: usize,
}

impl AppState {
    /// Build state from a dispatcher and the runtime configuration.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, config: &GlobalConfig) -> Self {
        Self {
            dispatcher,
            settings: config.sse_settings(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

#[derive(Clone)]
struct RouteState {
    app: Arc<AppState>,
    shutdown: CancellationToken,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Always `"healthy"`.
    pub status: &'static str,
    /// Server identity.
    pub server: ServerInfo,
    /// Preferred protocol version.
    pub protocol: String,
    /// RFC 3339 timestamp of the check.
    pub timestamp: String,
    /// Registered tool names, in order.
    pub tools: Vec<String>,
    /// Path of the MCP endpoint.
    pub endpoint: &'static str,
}

impl HealthReport {
    /// Snapshot the dispatcher's identity and catalog.
    #[must_use]
    pub fn capture(dispatcher: &Dispatcher) -> Self {
        Self {
            status: "healthy",
            server: dispatcher.server_info().clone(),
            protocol: dispatcher.protocol_version().to_owned(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            tools: dispatcher
                .registry()
                .names()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            endpoint: SSE_PATH,
        }
    }
}

/// Build the router. Open SSE streams close when `shutdown` is cancelled.
pub fn router(state: Arc<AppState>, shutdown: CancellationToken) -> Router {
    let body_limit = state.max_body_bytes;
    let route_state = RouteState {
        app: state,
        shutdown,
    };

    let routes = Router::new()
        .route("/", get(health).fallback(not_found))
        .route("/health", get(health).fallback(not_found))
        .route(SSE_PATH, get(open_sse).post(post_sse).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(route_state);

    with_front_door_layers(routes)
}

/// Wrap `routes` in the layers shared by every response.
///
/// Outermost first: CORS headers, the panic guard, then the `OPTIONS` shim.
/// CORS sits outside the guard so a 500 still carries its headers.
pub fn with_front_door_layers(routes: Router) -> Router {
    routes
        .layer(middleware::from_fn(answer_options))
        .layer(middleware::from_fn(catch_panic))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(PREFLIGHT_MAX_AGE)
}

async fn health(State(state): State<RouteState>) -> Json<HealthReport> {
    Json(HealthReport::capture(&state.app.dispatcher))
}

async fn open_sse(State(state): State<RouteState>) -> Response {
    sse::open_stream(&state.app.dispatcher, state.app.settings, &state.shutdown)
}

async fn post_sse(State(state): State<RouteState>, body: Bytes) -> Response {
    sse::reply_to_post(
        &state.app.dispatcher,
        &body,
        state.app.settings,
        &state.shutdown,
    )
    .await
}

async fn not_found(method: Method, uri: axum::http::Uri) -> Response {
    if uri.path().starts_with("/favicon") {
        return StatusCode::NOT_FOUND.into_response();
    }
    warn!(%method, path = uri.path(), "no route");
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

/// Answer `OPTIONS` on any path with an empty 200, preflight or not.
async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

/// Turn a panicking handler into `500 {"error":"Internal Server Error"}`.
async fn catch_panic(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            error!(%method, %path, "request handler panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal Server Error" })),
            )
                .into_response()
        }
    }
}

/// Bind the configured address and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Transport` if the listener cannot be bound or the
/// server fails.
pub async fn serve(state: Arc<AppState>, bind: SocketAddr, ct: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Transport(format!("failed to bind {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Transport` if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Transport(format!("listener has no address: {err}")))?;
    let app = router(state, ct.clone());

    info!(%addr, endpoint = SSE_PATH, "starting HTTP/SSE MCP transport");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Transport(format!("server error: {err}")))?;

    info!("HTTP/SSE MCP transport shut down");
    Ok(())
}
