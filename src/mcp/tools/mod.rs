/// MCP tools: the static catalog, the dispatcher and the Jira handlers
pub mod jira;
pub mod registry;

pub use self::registry::ToolRegistry;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed set of tools this server offers, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListProjects,
    GetIssue,
    GetComments,
    GetTicketSummary,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::ListProjects,
        ToolName::GetIssue,
        ToolName::GetComments,
        ToolName::GetTicketSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ListProjects => "list_projects",
            ToolName::GetIssue => "get_issue",
            ToolName::GetComments => "get_comments",
            ToolName::GetTicketSummary => "get_ticket_summary",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool information advertised through `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Content types a tool response can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Uniform envelope returned for every tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub content: Vec<Content>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResponse {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Text of the single content block
    pub fn text(&self) -> &str {
        match self.content.first() {
            Some(Content::Text { text }) => text,
            None => "",
        }
    }
}
