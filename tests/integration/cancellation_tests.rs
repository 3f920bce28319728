//! Integration tests for tool cancellation on server shutdown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::test_helpers::{fast_settings, post_sse, spawn_server};

#[tokio::test]
async fn shutdown_cancels_in_flight_tool_and_still_answers() {
    let server = spawn_server(fast_settings()).await;

    let pending = {
        let url = server.url("/sse");
        tokio::spawn(async move {
            reqwest::Client::new()
                .post(url)
                .body(r#"{"jsonrpc":"2.0","id":11,"method":"tools/call","params":{"name":"stalled"}}"#)
                .send()
                .await
                .expect("post")
                .text()
                .await
                .expect("body")
        })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!server.observed_cancel.load(Ordering::SeqCst));
    server.ct.cancel();

    let body = tokio::time::timeout(Duration::from_secs(3), pending)
        .await
        .expect("answered after shutdown")
        .expect("join");
    let payload = body
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .expect("one record");
    let frame: serde_json::Value = serde_json::from_str(payload).expect("json");
    assert_eq!(frame["id"], 11);
    assert_eq!(frame["error"]["code"], -32000);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !server.observed_cancel.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tool observed cancellation");
}

#[tokio::test]
async fn completed_request_does_not_leave_tool_token_live() {
    let server = spawn_server(fast_settings()).await;

    let resp = post_sse(&server, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
    assert_eq!(resp.status(), 200);
    resp.text().await.expect("body");
    assert!(!server.observed_cancel.load(Ordering::SeqCst));

    server.ct.cancel();
}
