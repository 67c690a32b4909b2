use jsonschema::JSONSchema;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jira::Tracker;
use crate::mcp::errors::ToolError;
use crate::mcp::tools::jira::{self, JiraTools};
use crate::mcp::tools::{ToolDescriptor, ToolName, ToolResponse};

const MAX_LOGGED_STRING: usize = 64;

lazy_static! {
    static ref CATALOG: Vec<ToolDescriptor> = ToolName::ALL.into_iter().map(jira::descriptor).collect();
    static ref SCHEMAS: HashMap<ToolName, JSONSchema> = ToolName::ALL
        .into_iter()
        .map(|tool| {
            let schema = JSONSchema::compile(&jira::input_schema(tool))
                .expect("built-in tool schemas compile");
            (tool, schema)
        })
        .collect();
    static ref SENSITIVE_KEY: Regex =
        Regex::new(r"(?i)token|secret|password|auth|key_cert").expect("pattern is valid");
}

/// Static tool catalog, in advertised order. Needs no tracker.
pub fn catalog() -> &'static [ToolDescriptor] {
    &CATALOG
}

/// Dispatcher from `{name, arguments}` to a Jira handler.
///
/// Holds no per-call state. Every call is validated against the tool's
/// schema before the tracker is touched, runs under the configured
/// timeout, and always produces an envelope.
pub struct ToolRegistry {
    tools: JiraTools,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(tracker: Arc<dyn Tracker>, timeout: Duration) -> Self {
        Self {
            tools: JiraTools::new(tracker),
            timeout,
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        catalog().to_vec()
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> ToolResponse {
        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        let arguments = match arguments {
            None | Some(Value::Null) => json!({}),
            Some(value) => value,
        };

        info!(
            "Executing tool: {} with ID: {} arguments: {}",
            name,
            execution_id,
            redact_arguments(&arguments)
        );

        match self.execute(name, &arguments).await {
            Ok(text) => {
                info!(
                    "Tool {} ({}) completed in {:?}",
                    name,
                    execution_id,
                    started.elapsed()
                );
                ToolResponse::success(text)
            }
            Err(e) => self.failure(name, &execution_id.to_string(), e),
        }
    }

    /// Envelope for a call the client cancelled while it was in flight
    pub fn cancelled(&self, name: &str, request_id: &str) -> ToolResponse {
        self.failure(name, request_id, ToolError::Cancelled)
    }

    async fn execute(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        let tool = ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        validate_arguments(tool, arguments)?;

        match tokio::time::timeout(self.timeout, self.tools.call(tool, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn failure(&self, name: &str, id: &str, error: ToolError) -> ToolResponse {
        match &error {
            ToolError::Connection(_) | ToolError::Timeout { .. } | ToolError::Internal(_) => {
                error!("Tool {} ({}) failed [{}]: {}", name, id, error.kind(), error)
            }
            ToolError::UnknownTool(_)
            | ToolError::InvalidArguments(_)
            | ToolError::NotFound(_)
            | ToolError::Cancelled => {
                warn!("Tool {} ({}) failed [{}]: {}", name, id, error.kind(), error)
            }
        }
        ToolResponse::error(error.to_string())
    }
}

/// First schema violation, if any
fn validate_arguments(tool: ToolName, arguments: &Value) -> Result<(), ToolError> {
    let schema = SCHEMAS
        .get(&tool)
        .ok_or_else(|| ToolError::Internal(format!("No schema for {}", tool)))?;

    if let Err(mut errors) = schema.validate(arguments) {
        let first = errors
            .next()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "arguments do not match the tool schema".to_string());
        return Err(ToolError::InvalidArguments(first));
    }

    Ok(())
}

/// Copy of `value` safe to log: credential-like keys masked, long strings cut
pub fn redact_arguments(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let v = if SENSITIVE_KEY.is_match(key) {
                        json!("***")
                    } else {
                        redact_arguments(v)
                    };
                    (key.clone(), v)
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_arguments).collect()),
        Value::String(s) if s.chars().count() > MAX_LOGGED_STRING => {
            let cut: String = s.chars().take(MAX_LOGGED_STRING).collect();
            Value::String(format!("{}...", cut))
        }
        other => other.clone(),
    }
}
