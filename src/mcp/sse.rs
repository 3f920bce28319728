//! HTTP/SSE transport for MCP connections.
//!
//! `GET /sse` opens a long-lived [`Connection`]: the handshake notifications
//! are queued first, then a heartbeat task pushes `ping` notifications until a
//! lifetime task forces the stream closed. Every write goes through one
//! bounded channel, so each `data: <json>\n\n` record reaches the socket
//! whole and in order.
//!
//! `POST /sse` is an independent cycle: the body is dispatched once and the
//! single Response frame is streamed back before the response ends after a
//! short flush delay.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::dispatcher::Dispatcher;
use super::jsonrpc::{build_notification, JsonRpcResponse};
use crate::{AppError, Result};

/// Notification sent first on every new stream.
pub const INITIALIZED_METHOD: &str = "notification/initialized";
/// Notification carrying the catalog snapshot, sent second.
pub const TOOLS_LIST_CHANGED_METHOD: &str = "notification/tools/list_changed";
/// Heartbeat notification.
pub const PING_METHOD: &str = "notification/ping";

/// Frames buffered per connection before heartbeats start being dropped.
const CHANNEL_CAPACITY: usize = 32;

/// Serialized fallback used when a Response cannot be encoded.
const INTERNAL_ERROR_FRAME: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Timer settings for SSE connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SseSettings {
    /// Interval between heartbeat `ping` notifications.
    pub heartbeat_interval: Duration,
    /// Hard ceiling on the lifetime of a `GET` stream.
    pub max_lifetime: Duration,
    /// Delay before a `POST` response is ended after its frame.
    pub post_flush_delay: Duration,
}

impl Default for SseSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            max_lifetime: Duration::from_secs(50),
            post_flush_delay: Duration::from_millis(100),
        }
    }
}

/// One complete SSE record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    json: String,
}

impl SseFrame {
    /// Serialize `message` into a frame.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Mcp` if `message` cannot be serialized.
    pub fn from_message<T: Serialize>(message: &T) -> Result<Self> {
        serde_json::to_string(message)
            .map(|json| Self { json })
            .map_err(|err| AppError::Mcp(format!("failed to encode sse frame: {err}")))
    }

    /// JSON payload of the frame.
    #[must_use]
    pub fn json(&self) -> &str {
        &self.json
    }

    /// Wire bytes: `data: <json>\n\n`.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.json))
    }
}

/// Lifecycle of a `GET /sse` connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Headers sent, handshake not yet queued.
    Connecting,
    /// Handshake queued, timers running.
    Open,
    /// Teardown in progress.
    Closing,
    /// Terminal; no further writes.
    Closed,
}

/// Why a connection left the `Open` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client dropped the stream.
    ClientClosed,
    /// A write found the stream gone.
    TransportError,
    /// The lifetime ceiling elapsed.
    LifetimeElapsed,
    /// The server is shutting down.
    Shutdown,
}

#[derive(Debug)]
struct Lifecycle {
    state: ConnectionState,
    reason: Option<CloseReason>,
}

/// A single `GET /sse` session.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    lifecycle: Mutex<Lifecycle>,
    sender: Mutex<Option<mpsc::Sender<SseFrame>>>,
    cancel: CancellationToken,
    heartbeat_cancel: CancellationToken,
}

impl Connection {
    /// Open a connection: queue the handshake and start both timers.
    ///
    /// Must be called inside a tokio runtime. The returned stream owns the
    /// connection; dropping it closes the connection.
    #[must_use]
    pub fn open(
        dispatcher: &Dispatcher,
        settings: SseSettings,
        shutdown: &CancellationToken,
    ) -> (Arc<Self>, SseStream) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = shutdown.child_token();
        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            lifecycle: Mutex::new(Lifecycle {
                state: ConnectionState::Connecting,
                reason: None,
            }),
            sender: Mutex::new(Some(tx)),
            heartbeat_cancel: cancel.child_token(),
            cancel,
        });

        info!(connection_id = %connection.id, "sse connection established");
        connection.send_handshake(dispatcher);
        connection.mark_open();

        let span = info_span!("sse_connection", connection_id = %connection.id);
        tokio::spawn(
            Arc::clone(&connection)
                .run_heartbeat(settings.heartbeat_interval)
                .instrument(span.clone()),
        );
        tokio::spawn(
            Arc::clone(&connection)
                .run_lifetime(settings.max_lifetime)
                .instrument(span),
        );

        let stream = SseStream {
            rx,
            guard: ConnectionGuard(Arc::clone(&connection)),
        };
        (connection, stream)
    }

    /// Connection identifier used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock_lifecycle().state
    }

    /// Why the connection closed, once it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock_lifecycle().reason
    }

    /// Whether the heartbeat timer has been released.
    #[must_use]
    pub fn heartbeat_cancelled(&self) -> bool {
        self.heartbeat_cancel.is_cancelled()
    }

    /// Queue one frame. Returns `false` once the connection is closed.
    ///
    /// A full channel drops the frame with a warning rather than blocking the
    /// caller; a vanished receiver tears the connection down.
    pub fn write(&self, frame: SseFrame) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sender.as_ref() else {
            debug!(connection_id = %self.id, "write after close dropped");
            return false;
        };

        match tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %self.id, "sse stream backlogged; frame dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                drop(sender);
                warn!(connection_id = %self.id, "sse write failed: stream gone");
                self.close(CloseReason::TransportError);
                false
            }
        }
    }

    /// Leave the `Open` state. Idempotent; returns `true` only for the call
    /// that actually closed the connection.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut lifecycle = self.lock_lifecycle();
            match lifecycle.state {
                ConnectionState::Connecting | ConnectionState::Open => {
                    lifecycle.state = ConnectionState::Closing;
                    lifecycle.reason = Some(reason);
                }
                ConnectionState::Closing | ConnectionState::Closed => return false,
            }
        }

        self.heartbeat_cancel.cancel();
        self.cancel.cancel();
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        self.lock_lifecycle().state = ConnectionState::Closed;
        info!(connection_id = %self.id, ?reason, "sse connection closed");
        true
    }

    fn send_handshake(&self, dispatcher: &Dispatcher) {
        let initialized = build_notification(INITIALIZED_METHOD, json!({}));
        let list_changed = build_notification(
            TOOLS_LIST_CHANGED_METHOD,
            json!({ "tools": dispatcher.registry().list() }),
        );

        for notification in [initialized, list_changed] {
            match SseFrame::from_message(&notification) {
                Ok(frame) => {
                    self.write(frame);
                }
                Err(err) => error!(connection_id = %self.id, %err, "handshake frame dropped"),
            }
        }
    }

    async fn run_heartbeat(self: Arc<Self>, period: Duration) {
        let frame = match SseFrame::from_message(&build_notification(PING_METHOD, json!({}))) {
            Ok(frame) => frame,
            Err(err) => {
                error!(%err, "heartbeat disabled");
                return;
            }
        };

        let Some(first_tick) = Instant::now().checked_add(period) else {
            warn!(?period, "heartbeat interval out of range; heartbeat disabled");
            return;
        };
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.heartbeat_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("heartbeat");
                    if !self.write(frame.clone()) {
                        break;
                    }
                }
            }
        }
        debug!("heartbeat stopped");
    }

    async fn run_lifetime(self: Arc<Self>, ceiling: Duration) {
        tokio::select! {
            () = self.cancel.cancelled() => {
                // Parent shutdown lands here; a local close is a no-op.
                self.close(CloseReason::Shutdown);
            }
            () = sleep(ceiling) => {
                info!(
                    seconds = ceiling.as_secs_f64(),
                    "sse connection auto-closing at lifetime ceiling"
                );
                self.close(CloseReason::LifetimeElapsed);
            }
        }
    }

    fn mark_open(&self) {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.state == ConnectionState::Connecting {
            lifecycle.state = ConnectionState::Open;
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Closes the connection when the owning stream is dropped.
#[derive(Debug)]
struct ConnectionGuard(Arc<Connection>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.close(CloseReason::ClientClosed);
    }
}

/// Frame stream for one `GET /sse` connection.
///
/// Ends once the connection is closed and the queued frames are drained.
#[derive(Debug)]
pub struct SseStream {
    rx: mpsc::Receiver<SseFrame>,
    guard: ConnectionGuard,
}

impl SseStream {
    /// The connection this stream belongs to.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.guard.0
    }
}

impl Stream for SseStream {
    type Item = SseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Stream for a `POST` reply: the frame, then a flush delay, then the end.
pub fn post_reply_stream(
    frame: SseFrame,
    flush_delay: Duration,
) -> impl Stream<Item = SseFrame> + Send + 'static {
    futures_util::stream::unfold(Some(frame), move |pending| async move {
        match pending {
            Some(frame) => Some((frame, None)),
            None => {
                sleep(flush_delay).await;
                None
            }
        }
    })
}

/// Encode a Response, falling back to a generic -32603 frame.
#[must_use]
pub fn response_frame(response: &JsonRpcResponse) -> SseFrame {
    SseFrame::from_message(response).unwrap_or_else(|err| {
        error!(%err, id = %response.id, "response encoding failed");
        SseFrame {
            json: INTERNAL_ERROR_FRAME.to_owned(),
        }
    })
}

/// Wrap a frame stream in an HTTP response with event-stream headers.
pub fn event_stream_response<S>(frames: S) -> Response
where
    S: Stream<Item = SseFrame> + Send + 'static,
{
    let body = Body::from_stream(frames.map(|frame| Ok::<_, Infallible>(frame.encode())));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// `GET /sse`: open a connection and stream it.
pub fn open_stream(
    dispatcher: &Dispatcher,
    settings: SseSettings,
    shutdown: &CancellationToken,
) -> Response {
    let (_connection, stream) = Connection::open(dispatcher, settings, shutdown);
    event_stream_response(stream)
}

/// `POST /sse`: dispatch one message and stream back its single Response.
///
/// The cancellation token handed to the tool is cancelled when this future
/// finishes or is dropped, whichever comes first. A notification or a
/// client-side response yields `202 Accepted` with no body.
pub async fn reply_to_post(
    dispatcher: &Dispatcher,
    body: &[u8],
    settings: SseSettings,
    shutdown: &CancellationToken,
) -> Response {
    let cancel = shutdown.child_token();
    let _abandon = cancel.clone().drop_guard();

    debug!(bytes = body.len(), "received post body");
    let Some(reply) = dispatcher.handle_bytes(body, cancel).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    debug!(id = %reply.id, is_error = reply.error().is_some(), "sending json-rpc response");
    event_stream_response(post_reply_stream(
        response_frame(&reply),
        settings.post_flush_delay,
    ))
}
