//! Unit tests for the JSON-RPC envelope codec's public surface.

use ghl_mcp_server::mcp::jsonrpc::{
    build_notification, build_response, message_from_value, parse_message, ErrorCode,
    JsonRpcError, JsonRpcId, JsonRpcMessage,
};
use serde_json::{json, Value};

// ── Error code table ─────────────────────────────────────────

#[test]
fn error_codes_match_wire_values() {
    let table = [
        (ErrorCode::ParseError, -32700, "Parse error"),
        (ErrorCode::InvalidRequest, -32600, "Invalid Request"),
        (ErrorCode::MethodNotFound, -32601, "Method not found"),
        (ErrorCode::InvalidParams, -32602, "Invalid params"),
        (ErrorCode::InternalError, -32603, "Internal error"),
        (ErrorCode::ToolExecution, -32000, "Tool execution error"),
    ];
    for (code, wire, message) in table {
        assert_eq!(code.code(), wire);
        assert_eq!(code.message(), message);
    }
}

#[test]
fn method_not_found_names_the_method() {
    let err = JsonRpcError::method_not_found("resources/list");
    assert_eq!(err.code, -32601);
    assert_eq!(err.message, "Method not found: resources/list");
}

// ── Ids ──────────────────────────────────────────────────────

#[test]
fn string_id_survives_round_trip() {
    let resp = build_response(JsonRpcId::from("abc-1"), Ok(json!({ "ok": true })));
    let wire = serde_json::to_string(&resp).expect("serialize");
    assert_eq!(wire, r#"{"jsonrpc":"2.0","id":"abc-1","result":{"ok":true}}"#);

    match parse_message(wire.as_bytes()).expect("decode") {
        JsonRpcMessage::Response(decoded) => assert_eq!(decoded, resp),
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn explicit_null_id_is_a_request() {
    let msg = parse_message(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).expect("decode");
    match msg {
        JsonRpcMessage::Request(req) => assert_eq!(req.id, JsonRpcId::Null),
        other => panic!("expected request, got {other:?}"),
    }
}

#[test]
fn fractional_numeric_id_is_preserved() {
    let msg = parse_message(br#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#).expect("decode");
    let JsonRpcMessage::Request(req) = msg else {
        panic!("expected request");
    };
    assert_eq!(req.id.to_string(), "1.5");
}

#[test]
fn invalid_request_echoes_recoverable_id() {
    let err = parse_message(br#"{"jsonrpc":"1.0","id":"k","method":"ping"}"#)
        .expect_err("wrong version");
    let resp = err.into_response();
    assert_eq!(resp.id, JsonRpcId::from("k"));
    assert_eq!(resp.error().map(|e| e.code), Some(-32600));
}

#[test]
fn parse_error_always_uses_null_id() {
    let err = parse_message(br#"{"jsonrpc":"2.0","id":7,"method":"#).expect_err("truncated");
    assert_eq!(err.code(), ErrorCode::ParseError);
    assert_eq!(err.id(), &JsonRpcId::Null);
    assert!(!err.detail().is_empty());
}

// ── Classification ───────────────────────────────────────────

#[test]
fn array_params_are_accepted() {
    let msg = message_from_value(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/list",
        "params": [1, 2]
    }))
    .expect("decode");
    let JsonRpcMessage::Request(req) = msg else {
        panic!("expected request");
    };
    assert_eq!(req.params, Some(json!([1, 2])));
}

#[test]
fn batch_arrays_are_invalid_request() {
    let err = parse_message(br#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#)
        .expect_err("batches unsupported");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[test]
fn client_error_response_is_classified() {
    let msg = message_from_value(json!({
        "jsonrpc": "2.0",
        "id": 9,
        "error": { "code": -1, "message": "client side" }
    }))
    .expect("decode");
    let JsonRpcMessage::Response(resp) = msg else {
        panic!("expected response");
    };
    assert_eq!(resp.error().map(|e| e.message.as_str()), Some("client side"));
}

// ── Notifications ────────────────────────────────────────────

#[test]
fn built_notification_has_no_id_and_keeps_params() {
    let note = build_notification("notification/ping", json!({}));
    let value: Value = serde_json::to_value(&note).expect("serialize");
    assert_eq!(
        value,
        json!({ "jsonrpc": "2.0", "method": "notification/ping", "params": {} })
    );
}
