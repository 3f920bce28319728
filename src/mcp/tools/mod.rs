//! Built-in tool providers.

use std::sync::Arc;

use crate::mcp::registry::ToolProvider;

pub mod crm;

/// Providers registered at startup, in advertisement order.
#[must_use]
pub fn builtin_providers() -> Vec<Arc<dyn ToolProvider>> {
    vec![Arc::new(crm::CrmTools)]
}
