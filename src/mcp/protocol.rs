use crate::mcp::errors::{JsonRpcError, MCPError, MCPResult, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 message structure for MCP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MCPMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Request message structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Notification message structure (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl MCPMessage {
    const JSONRPC_VERSION: &'static str = "2.0";

    /// Create a new request message with a fresh id
    pub fn response(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: Self::JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn error_response(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Self::JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.id.is_some()
            && self.method.is_none()
            && (self.result.is_some() || self.error.is_some())
    }

    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// Validate the message structure
    pub fn validate(&self) -> MCPResult<()> {
        if self.jsonrpc != Self::JSONRPC_VERSION {
            return Err(invalid(format!("Invalid JSON-RPC version: {}", self.jsonrpc)));
        }

        if self.is_request() || self.is_notification() {
            if self.result.is_some() || self.error.is_some() {
                return Err(invalid("Request message cannot have result or error fields"));
            }
        } else if self.is_response() {
            if self.params.is_some() {
                return Err(invalid("Response message cannot have params"));
            }
            if self.result.is_some() && self.error.is_some() {
                return Err(invalid("Response cannot have both result and error"));
            }
        } else {
            return Err(invalid(
                "Message does not match any valid type (request, response, notification)",
            ));
        }

        Ok(())
    }

    /// Convert to typed request
    pub fn as_request(&self) -> MCPResult<MCPRequest> {
        match (&self.id, &self.method) {
            (Some(id), Some(method)) => Ok(MCPRequest {
                jsonrpc: self.jsonrpc.clone(),
                id: id.clone(),
                method: method.clone(),
                params: self.params.clone(),
            }),
            _ => Err(invalid("Message is not a request")),
        }
    }

    /// Convert to typed notification
    pub fn as_notification(&self) -> MCPResult<MCPNotification> {
        match (&self.id, &self.method) {
            (None, Some(method)) => Ok(MCPNotification {
                jsonrpc: self.jsonrpc.clone(),
                method: method.clone(),
                params: self.params.clone(),
            }),
            _ => Err(invalid("Message is not a notification")),
        }
    }
}

fn invalid(message: impl Into<String>) -> MCPError {
    MCPError::Protocol(ProtocolError::InvalidMessage(message.into()))
}

/// MCP protocol initialization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Server capabilities. Only tools are offered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Initialize response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// `tools/call` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// `notifications/cancelled` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledParams {
    #[serde(rename = "requestId")]
    pub request_id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Newline-delimited JSON framing
pub struct MessageParser;

impl MessageParser {
    pub fn parse_message(data: &[u8]) -> MCPResult<MCPMessage> {
        let message: MCPMessage = serde_json::from_slice(data)
            .map_err(|e| MCPError::Protocol(ProtocolError::ParseError(e.to_string())))?;

        message.validate()?;
        Ok(message)
    }

    /// Serialize to a single line of JSON without the trailing newline
    pub fn serialize_message(message: &MCPMessage) -> MCPResult<Vec<u8>> {
        message.validate()?;
        serde_json::to_vec(message)
            .map_err(|e| MCPError::Protocol(ProtocolError::InternalError(e.to_string())))
    }
}
