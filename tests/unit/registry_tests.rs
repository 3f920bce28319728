//! Unit tests for `ToolRegistry` assembly and lookup.

use std::sync::Arc;

use ghl_mcp_server::mcp::context::ToolContext;
use ghl_mcp_server::mcp::jsonrpc::JsonRpcId;
use ghl_mcp_server::mcp::registry::{ToolError, ToolFuture, ToolProvider, ToolRegistry};
use ghl_mcp_server::mcp::tools::builtin_providers;
use ghl_mcp_server::mcp::types::{Content, Tool};
use ghl_mcp_server::AppError;
use serde_json::{json, Value};

/// Provider exposing several names through one handler.
struct Multi(&'static [&'static str]);

impl ToolProvider for Multi {
    fn describe(&self) -> Vec<Tool> {
        self.0
            .iter()
            .map(|name| Tool::new(*name, "multi", json!({ "type": "object" })))
            .collect()
    }

    fn invoke<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
        _context: ToolContext,
    ) -> ToolFuture<'a> {
        Box::pin(async move {
            if arguments.get("fail").is_some() {
                return Err(ToolError::new(format!("{name} refused")));
            }
            Ok(vec![Content::text(name)])
        })
    }
}

#[test]
fn builtin_registry_lists_search_then_retrieve() {
    let registry = ToolRegistry::load(builtin_providers()).expect("builtin load");
    assert_eq!(registry.names(), vec!["search", "retrieve"]);
    assert!(!registry.is_empty());
}

#[test]
fn lookup_searches_every_provider() {
    let registry = ToolRegistry::load(vec![
        Arc::new(Multi(&["alpha", "beta"])) as Arc<dyn ToolProvider>,
        Arc::new(Multi(&["gamma"])),
    ])
    .expect("load");

    for name in ["alpha", "beta", "gamma"] {
        let handle = registry.find(name).expect("registered");
        assert_eq!(handle.tool().name, name);
    }
}

#[test]
fn builtin_plus_colliding_provider_fails() {
    let mut providers = builtin_providers();
    providers.push(Arc::new(Multi(&["retrieve"])));
    let err = ToolRegistry::load(providers).expect_err("collision");
    assert!(matches!(err, AppError::Registry(_)));
    assert!(err.to_string().contains("retrieve"));
}

#[test]
fn empty_provider_list_is_valid() {
    let registry = ToolRegistry::load(Vec::new()).expect("empty load");
    assert!(registry.is_empty());
    assert!(registry.list().is_empty());
}

#[tokio::test]
async fn handler_error_is_returned_not_raised() {
    let registry = ToolRegistry::load(vec![Arc::new(Multi(&["gate"])) as Arc<dyn ToolProvider>])
        .expect("load");
    let err = registry
        .find("gate")
        .expect("registered")
        .invoke(json!({ "fail": true }), ToolContext::detached(JsonRpcId::from(1)))
        .await
        .expect_err("handler error");
    assert_eq!(err.message(), "gate refused");
}
