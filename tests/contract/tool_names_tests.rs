//! Contract tests pinning the advertised tool names.

use ghl_mcp_server::mcp::registry::ToolRegistry;
use ghl_mcp_server::mcp::tools::builtin_providers;
use ghl_mcp_server::mcp::tools::crm::{RETRIEVE, SEARCH};

#[test]
fn advertised_names_are_search_and_retrieve() {
    let registry = ToolRegistry::load(builtin_providers()).expect("load");
    assert_eq!(registry.names(), vec![SEARCH, RETRIEVE]);
    assert_eq!(SEARCH, "search");
    assert_eq!(RETRIEVE, "retrieve");
}

#[test]
fn names_are_unique() {
    let registry = ToolRegistry::load(builtin_providers()).expect("load");
    let mut names = registry.names();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), registry.len());
}
