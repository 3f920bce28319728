//! Contract tests for tool descriptor schemas.

use ghl_mcp_server::mcp::registry::ToolRegistry;
use ghl_mcp_server::mcp::tools::builtin_providers;
use serde_json::{json, Value};

fn descriptor(name: &str) -> Value {
    let registry = ToolRegistry::load(builtin_providers()).expect("load");
    let tool = registry
        .list()
        .iter()
        .find(|tool| tool.name == name)
        .expect("registered");
    serde_json::to_value(tool).expect("serialize")
}

#[test]
fn descriptors_use_camel_case_input_schema() {
    let search = descriptor("search");
    assert!(search.get("inputSchema").is_some());
    assert!(search.get("input_schema").is_none());
    assert!(search["description"].as_str().is_some_and(|d| !d.is_empty()));
}

#[test]
fn search_requires_query_string() {
    let schema = &descriptor("search")["inputSchema"];
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["query"]["type"], "string");
    assert_eq!(schema["required"], json!(["query"]));
}

#[test]
fn retrieve_requires_id_and_typed_kind() {
    let schema = &descriptor("retrieve")["inputSchema"];
    assert_eq!(schema["properties"]["id"]["type"], "string");
    assert_eq!(
        schema["properties"]["type"]["enum"],
        json!(["contact", "conversation", "blog"])
    );
    assert_eq!(schema["required"], json!(["id", "type"]));
}
