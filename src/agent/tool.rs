//! Tool type definitions for the evidence-gathering loop.
//!
//! Provides provider-agnostic types for tool definitions, calls, and
//! results, plus the strict four-tool catalog exposed to the model during
//! phase one: `knowledge_base`, `fetch_articles`, `search_articles`, and
//! `escalate_to_human`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::{Escalation, FetchedArticle};

/// Maximum URLs accepted by one `fetch_articles` call.
pub const MAX_FETCH_URLS: usize = 15;

/// Maximum hits returned by one `search_articles` call.
pub const MAX_SEARCH_HITS: usize = 8;

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match the dispatch table in the executor).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call.
///
/// `content` goes back to the model; the optional fetched articles and
/// escalation mutate the loop state.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result content rendered for the model.
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
    /// Articles successfully fetched by this call.
    pub fetched: Vec<FetchedArticle>,
    /// Escalation drafted by this call.
    pub escalation: Option<Escalation>,
}

impl ToolResult {
    /// A plain success result with no loop-state side effects.
    #[must_use]
    pub fn text(tool_call_id: &str, content: String) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content,
            is_error: false,
            fetched: Vec::new(),
            escalation: None,
        }
    }

    /// An error result; the message is rendered to the model so it can
    /// observe and react.
    #[must_use]
    pub fn error(tool_call_id: &str, message: String) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: message,
            is_error: true,
            fetched: Vec::new(),
            escalation: None,
        }
    }
}

/// Returns the evidence-gathering tool catalog, in a fixed order.
#[must_use]
pub fn evidence_tools() -> Vec<ToolDefinition> {
    vec![
        def_knowledge_base(),
        def_fetch_articles(),
        def_search_articles(),
        def_escalate_to_human(),
    ]
}

// ---------------------------------------------------------------------------
// Tool schema definitions
// ---------------------------------------------------------------------------

/// Defines the `knowledge_base` tool.
fn def_knowledge_base() -> ToolDefinition {
    ToolDefinition {
        name: "knowledge_base".to_string(),
        description: "Browse the table of contents of all Light help articles, grouped by \
                      area. Use this first when you are unsure which articles exist."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

/// Defines the `fetch_articles` tool.
fn def_fetch_articles() -> ToolDefinition {
    ToolDefinition {
        name: "fetch_articles".to_string(),
        description: format!(
            "Fetch the full content of up to {MAX_FETCH_URLS} help articles by URL or path. \
             Only fetched articles may be cited in the final answer."
        ),
        parameters: json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": MAX_FETCH_URLS,
                    "description": "Article URLs or repo-relative paths to fetch."
                }
            },
            "required": ["urls"],
            "additionalProperties": false
        }),
    }
}

/// Defines the `search_articles` tool.
fn def_search_articles() -> ToolDefinition {
    ToolDefinition {
        name: "search_articles".to_string(),
        description: format!(
            "Search help articles by meaning and return up to {MAX_SEARCH_HITS} full \
             articles ranked by semantic similarity. Results count as fetched and may \
             be cited."
        ),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language search query."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

/// Defines the `escalate_to_human` tool.
fn def_escalate_to_human() -> ToolDefinition {
    ToolDefinition {
        name: "escalate_to_human".to_string(),
        description: "Draft an escalation to the Light team when the docs cannot answer \
                      the question. Does not end the conversation."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Short escalation title."
                },
                "request_type": {
                    "type": "string",
                    "enum": ["feature_request", "bug_report", "support_needed", "documentation_gap"],
                    "description": "Escalation category."
                },
                "problem_statement": {
                    "type": "string",
                    "description": "What the asker needs and why the docs do not cover it."
                }
            },
            "required": ["title", "request_type", "problem_statement"],
            "additionalProperties": false
        }),
    }
}
