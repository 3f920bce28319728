//! `search` and `retrieve` CRM tools.
//!
//! Both descriptors are served by one provider and one handler, which
//! branches on the invocation-time tool name. Results are canned text; no
//! external CRM is contacted.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, info_span, Instrument};

use crate::mcp::context::ToolContext;
use crate::mcp::registry::{ToolError, ToolFuture, ToolProvider};
use crate::mcp::types::{Content, Tool};

/// Name of the search tool.
pub const SEARCH: &str = "search";
/// Name of the retrieve tool.
pub const RETRIEVE: &str = "retrieve";

/// Input for `search`.
#[derive(Debug, Deserialize)]
struct SearchInput {
    /// Free-text query.
    query: String,
}

/// Kinds of record `retrieve` can fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ItemKind {
    Contact,
    Conversation,
    Blog,
}

impl ItemKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Conversation => "conversation",
            Self::Blog => "blog",
        }
    }
}

/// Input for `retrieve`.
#[derive(Debug, Deserialize)]
struct RetrieveInput {
    id: String,
    #[serde(rename = "type")]
    kind: ItemKind,
}

/// Provider for the CRM tool pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrmTools;

impl ToolProvider for CrmTools {
    fn describe(&self) -> Vec<Tool> {
        vec![
            Tool::new(
                SEARCH,
                "Search for information in GoHighLevel CRM system",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query for GoHighLevel data"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            Tool::new(
                RETRIEVE,
                "Retrieve specific data from GoHighLevel",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "string",
                            "description": "ID of the item to retrieve"
                        },
                        "type": {
                            "type": "string",
                            "enum": ["contact", "conversation", "blog"],
                            "description": "Type of item to retrieve"
                        }
                    },
                    "required": ["id", "type"]
                }),
            ),
        ]
    }

    fn invoke<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
        context: ToolContext,
    ) -> ToolFuture<'a> {
        let span = info_span!("crm_tool", tool = name, id = %context.request_id);
        Box::pin(
            async move {
                if context.is_cancelled() {
                    return Err(ToolError::cancelled());
                }
                let text = match name {
                    SEARCH => search(parse(name, arguments)?),
                    RETRIEVE => retrieve(parse(name, arguments)?),
                    other => return Err(ToolError::new(format!("unsupported tool: {other}"))),
                };
                info!("crm tool completed");
                Ok(vec![Content::text(text)])
            }
            .instrument(span),
        )
    }
}

fn parse<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|err| ToolError::new(format!("invalid {tool} arguments: {err}")))
}

fn search(input: SearchInput) -> String {
    format!(
        "GoHighLevel Search Results for: \"{query}\"\n\n\
         \u{2705} Found Results:\n\
         \u{2022} Contact: John Doe (john@example.com)\n\
         \u{2022} Contact: Jane Smith (jane@example.com)\n\
         \u{2022} Conversation: \"Follow-up call scheduled\"\n\
         \u{2022} Blog Post: \"How to Generate More Leads\"\n\n\
         \u{1f4ca} Search completed successfully in GoHighLevel CRM.",
        query = input.query
    )
}

fn retrieve(input: RetrieveInput) -> String {
    let kind = input.kind.as_str();
    let updated = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    format!(
        "GoHighLevel {kind} Retrieved: ID {id}\n\n\
         \u{1f4c4} Details:\n\
         \u{2022} Name: Sample {kind}\n\
         \u{2022} Status: Active\n\
         \u{2022} Last Updated: {updated}\n\
         \u{2022} Source: GoHighLevel CRM\n\n\
         \u{2705} Data retrieved successfully from GoHighLevel.",
        id = input.id
    )
}
