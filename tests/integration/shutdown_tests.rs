//! Integration tests for graceful shutdown.

use std::time::Duration;

use super::test_helpers::{spawn_server, SseReader};
use ghl_mcp_server::mcp::sse::SseSettings;

#[tokio::test]
async fn shutdown_closes_open_streams_and_stops_server() {
    let settings = SseSettings {
        heartbeat_interval: Duration::from_secs(10),
        max_lifetime: Duration::from_secs(60),
        post_flush_delay: Duration::from_millis(10),
    };
    let server = spawn_server(settings).await;

    let resp = reqwest::get(server.url("/sse")).await.expect("GET /sse");
    let mut reader = SseReader::new(resp);
    reader
        .next_json(Duration::from_secs(2))
        .await
        .expect("initialized");
    reader
        .next_json(Duration::from_secs(2))
        .await
        .expect("list_changed");

    server.ct.cancel();

    let end = tokio::time::timeout(Duration::from_secs(3), reader.next_record())
        .await
        .expect("stream ends promptly on shutdown");
    assert!(end.is_none());

    let outcome = tokio::time::timeout(Duration::from_secs(3), server.handle)
        .await
        .expect("server stops")
        .expect("join");
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn bind_conflict_is_transport_error() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = taken.local_addr().expect("addr");

    let (state, _) = super::test_helpers::test_state(super::test_helpers::fast_settings());
    let ct = tokio_util::sync::CancellationToken::new();
    let err = ghl_mcp_server::mcp::http::serve(state, addr, ct)
        .await
        .expect_err("address in use");
    assert!(err.to_string().starts_with("transport: failed to bind"));
}
