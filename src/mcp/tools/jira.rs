/// Jira tool definitions and handlers
///
/// Each [`ToolName`] maps to one schema here and one arm of
/// [`JiraTools::call`]. Arguments reaching the handlers have already been
/// validated against the schema.
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::jira::{TicketSummarizer, Tracker};
use crate::mcp::errors::ToolError;
use crate::mcp::tools::{ToolDescriptor, ToolName};

pub fn description(tool: ToolName) -> &'static str {
    match tool {
        ToolName::ListProjects => "List all Jira projects visible to the configured account",
        ToolName::GetIssue => "Get the fields of a Jira issue by key",
        ToolName::GetComments => "Get all comments on a Jira issue, oldest first",
        ToolName::GetTicketSummary => {
            "Get a composite summary of a Jira issue: fields, comments, a timeline of events, \
             the people involved and their roles, and the transitions currently available"
        }
    }
}

pub fn input_schema(tool: ToolName) -> Value {
    match tool {
        ToolName::ListProjects => json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
        ToolName::GetIssue | ToolName::GetComments | ToolName::GetTicketSummary => json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Issue key, e.g. PROJ-123"
                }
            },
            "required": ["key"],
            "additionalProperties": false
        }),
    }
}

pub fn descriptor(tool: ToolName) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.as_str().to_string(),
        description: description(tool).to_string(),
        input_schema: input_schema(tool),
    }
}

/// Handlers bound to one tracker session
pub struct JiraTools {
    tracker: Arc<dyn Tracker>,
    summarizer: TicketSummarizer,
}

impl JiraTools {
    pub fn new(tracker: Arc<dyn Tracker>) -> Self {
        Self {
            summarizer: TicketSummarizer::new(tracker.clone()),
            tracker,
        }
    }

    /// Run `tool` and render its result as pretty JSON
    pub async fn call(&self, tool: ToolName, arguments: &Value) -> Result<String, ToolError> {
        match tool {
            ToolName::ListProjects => {
                let projects = self.tracker.list_projects().await?;
                debug!("Found {} projects", projects.len());
                render(&projects)
            }
            ToolName::GetIssue => {
                let issue = self.tracker.get_issue(key_argument(arguments)?).await?;
                render(&issue)
            }
            ToolName::GetComments => {
                let comments = self.tracker.get_comments(key_argument(arguments)?).await?;
                render(&comments)
            }
            ToolName::GetTicketSummary => {
                let summary = self
                    .summarizer
                    .get_ticket_summary(key_argument(arguments)?)
                    .await?;
                render(&summary)
            }
        }
    }
}

fn key_argument(arguments: &Value) -> Result<&str, ToolError> {
    arguments
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("\"key\" is a required property".to_string()))
}

fn render<T: Serialize>(value: &T) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ToolError::Internal(format!("Failed to serialize result: {}", e)))
}
