use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jira::TrackerError;

pub type MCPResult<T> = Result<T, MCPError>;

/// Failures of the protocol host itself. These never reach tool callers as
/// envelopes.
#[derive(Debug, thiserror::Error)]
pub enum MCPError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Transport closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON-RPC message: {0}")]
    InvalidMessage(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Every way a tool call can fail. The dispatcher turns each one into an
/// error envelope whose text is the `Display` output below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Issue not found: {0}")]
    NotFound(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Short label used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::NotFound(_) => "not_found",
            ToolError::Connection(_) => "connection",
            ToolError::Timeout { .. } => "timeout",
            ToolError::Cancelled => "cancelled",
            ToolError::Internal(_) => "internal",
        }
    }
}

impl From<TrackerError> for ToolError {
    fn from(error: TrackerError) -> Self {
        match error {
            TrackerError::NotFound(key) => ToolError::NotFound(key),
            TrackerError::Connection(msg) => ToolError::Connection(msg),
            TrackerError::Unauthorized(msg) => ToolError::Connection(format!("auth failure: {}", msg)),
            TrackerError::Timeout(msg) => ToolError::Connection(format!("request timed out: {}", msg)),
            TrackerError::UnexpectedResponse(msg) => {
                ToolError::Internal(format!("unexpected response from Jira: {}", msg))
            }
        }
    }
}

/// JSON-RPC error codes
#[derive(Debug, Clone, Copy)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
        }
    }
}

impl From<MCPError> for JsonRpcError {
    fn from(error: MCPError) -> Self {
        match error {
            MCPError::Protocol(ProtocolError::MethodNotFound(msg)) => {
                JsonRpcError::new(JsonRpcErrorCode::MethodNotFound, format!("Method not found: {}", msg))
            }
            MCPError::Protocol(ProtocolError::InvalidParams(msg)) => {
                JsonRpcError::new(JsonRpcErrorCode::InvalidParams, format!("Invalid params: {}", msg))
            }
            MCPError::Protocol(ProtocolError::ParseError(msg)) => {
                JsonRpcError::new(JsonRpcErrorCode::ParseError, msg)
            }
            MCPError::Protocol(ProtocolError::InvalidMessage(msg)) => {
                JsonRpcError::new(JsonRpcErrorCode::InvalidRequest, msg)
            }
            _ => JsonRpcError::new(JsonRpcErrorCode::InternalError, error.to_string()),
        }
    }
}

impl From<ProtocolError> for JsonRpcError {
    fn from(error: ProtocolError) -> Self {
        MCPError::Protocol(error).into()
    }
}
