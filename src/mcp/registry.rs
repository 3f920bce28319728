//! Tool registry: the immutable catalog the dispatcher resolves tools from.
//!
//! Tools are contributed by [`ToolProvider`] implementations. A provider may
//! advertise several descriptors that all route to its single
//! [`invoke`](ToolProvider::invoke), distinguished by the name passed at call
//! time. The registry is assembled once by [`ToolRegistry::load`] and shared
//! read-only behind an `Arc` afterwards.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::mcp::context::ToolContext;
use crate::mcp::types::{Content, Tool};
use crate::{AppError, Result};

/// Boxed future returned by [`ToolProvider::invoke`].
pub type ToolFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<Vec<Content>, ToolError>> + Send + 'a>>;

/// Failure reported by a tool handler.
///
/// The message is forwarded to the client as the `data` of a -32000 error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError {
    message: String,
}

impl ToolError {
    /// Build an error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error used when an invocation is abandoned.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new("tool invocation cancelled")
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ToolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ToolError {}

/// A pluggable source of tools.
pub trait ToolProvider: Send + Sync {
    /// Descriptors this provider serves. Called once, at registry load.
    fn describe(&self) -> Vec<Tool>;

    /// Run the tool called `name` with `arguments`.
    ///
    /// `name` is always one of the names returned by [`describe`](Self::describe).
    fn invoke<'a>(&'a self, name: &'a str, arguments: Value, context: ToolContext)
        -> ToolFuture<'a>;
}

/// A resolved tool: its descriptor plus the provider that serves it.
#[derive(Clone, Copy)]
pub struct ToolHandle<'a> {
    tool: &'a Tool,
    provider: &'a dyn ToolProvider,
}

impl<'a> ToolHandle<'a> {
    /// Descriptor of the resolved tool.
    #[must_use]
    pub fn tool(&self) -> &'a Tool {
        self.tool
    }

    /// Invoke the provider under this tool's name.
    #[must_use]
    pub fn invoke(&self, arguments: Value, context: ToolContext) -> ToolFuture<'a> {
        self.provider.invoke(&self.tool.name, arguments, context)
    }
}

impl std::fmt::Debug for ToolHandle<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandle")
            .field("tool", &self.tool.name)
            .finish_non_exhaustive()
    }
}

/// Immutable, ordered catalog of tools.
pub struct ToolRegistry {
    tools: Vec<Tool>,
    owners: Vec<usize>,
    providers: Vec<Arc<dyn ToolProvider>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Assemble the registry from `providers`, in order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if a tool name is empty or is advertised
    /// more than once, within one provider or across providers.
    pub fn load(providers: Vec<Arc<dyn ToolProvider>>) -> Result<Self> {
        let mut tools = Vec::new();
        let mut owners = Vec::new();
        let mut index = HashMap::new();

        for (owner, provider) in providers.iter().enumerate() {
            for tool in provider.describe() {
                if tool.name.trim().is_empty() {
                    return Err(AppError::Registry("tool name must not be empty".into()));
                }
                if index.contains_key(&tool.name) {
                    return Err(AppError::Registry(format!(
                        "duplicate tool name: {}",
                        tool.name
                    )));
                }
                debug!(tool = %tool.name, provider = owner, "registering tool");
                index.insert(tool.name.clone(), tools.len());
                tools.push(tool);
                owners.push(owner);
            }
        }

        info!(
            tools = tools.len(),
            providers = providers.len(),
            "tool registry loaded"
        );

        Ok(Self {
            tools,
            owners,
            providers,
            index,
        })
    }

    /// Resolve a tool by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ToolHandle<'_>> {
        let slot = *self.index.get(name)?;
        let provider = self.providers.get(*self.owners.get(slot)?)?;
        Some(ToolHandle {
            tool: self.tools.get(slot)?,
            provider: provider.as_ref(),
        })
    }

    /// All tools in advertisement order.
    #[must_use]
    pub fn list(&self) -> &[Tool] {
        &self.tools
    }

    /// Tool names in advertisement order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish_non_exhaustive()
    }
}
