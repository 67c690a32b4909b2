/// MCP server loop
///
/// Reads JSON-RPC messages from a transport, answers protocol requests and
/// hands `tools/call` to the [`ToolRegistry`]. One tool call is in flight at
/// a time; messages arriving meanwhile are queued. A cancellation aborts the
/// running call, or answers a queued call without running it.
use serde_json::{Value, json};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

use crate::mcp::{
    MCP_PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
    errors::{JsonRpcError, MCPError, MCPResult, ProtocolError, TransportError},
    protocol::{
        CallToolParams, CancelledParams, InitializeParams, InitializeResult, MCPMessage,
        MCPNotification, MCPRequest, ServerCapabilities, ServerInfo, ToolsCapability,
    },
    tools::{ToolRegistry, ToolResponse},
    transport::MCPTransport,
};

pub struct MCPServer {
    registry: ToolRegistry,
}

impl MCPServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Serve until the peer closes its side of the transport
    pub async fn serve(&self, transport: &mut dyn MCPTransport) -> MCPResult<()> {
        info!("MCP server {} {} ready", SERVER_NAME, SERVER_VERSION);
        let mut pending: VecDeque<MCPMessage> = VecDeque::new();

        loop {
            let message = match pending.pop_front() {
                Some(message) => message,
                None => match transport.receive().await {
                    Ok(message) => message,
                    Err(MCPError::Transport(TransportError::Closed)) => {
                        debug!("Client closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Transport error: {}", e);
                        break;
                    }
                },
            };

            self.handle_message(message, transport, &mut pending).await?;
        }

        transport.close().await?;
        info!("MCP server stopped");
        Ok(())
    }

    async fn handle_message(
        &self,
        message: MCPMessage,
        transport: &mut dyn MCPTransport,
        pending: &mut VecDeque<MCPMessage>,
    ) -> MCPResult<()> {
        if message.is_request() {
            let request = message.as_request()?;
            let id = request.id.clone();
            let reply = match self.handle_request(request, transport, pending).await {
                Ok(result) => MCPMessage::response(id, result),
                Err(e) => {
                    warn!("Request failed: {}", e);
                    MCPMessage::error_response(id, JsonRpcError::from(e))
                }
            };
            transport.send(reply).await?;
        } else if message.is_notification() {
            self.handle_notification(message.as_notification()?);
        } else {
            debug!("Ignoring response message from client");
        }

        Ok(())
    }

    async fn handle_request(
        &self,
        request: MCPRequest,
        transport: &mut dyn MCPTransport,
        pending: &mut VecDeque<MCPMessage>,
    ) -> MCPResult<Value> {
        debug!("Handling request {} ({})", request.method, request.id);

        let method = request.method.clone();
        match method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list_tools() })),
            "tools/call" => {
                let params: CallToolParams = parse_params(request.params)?;
                let response = self
                    .handle_tool_call(&request.id, params, transport, pending)
                    .await;
                Ok(serde_json::to_value(response)?)
            }
            _ => Err(ProtocolError::MethodNotFound(request.method).into()),
        }
    }

    fn handle_notification(&self, notification: MCPNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => debug!("Client initialized"),
            "notifications/cancelled" => debug!("Cancellation for a request that is neither running nor queued"),
            other => debug!("Ignoring notification {}", other),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> MCPResult<Value> {
        if let Some(params) = params {
            let params: InitializeParams = serde_json::from_value(params)
                .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;
            let client = params
                .client_info
                .map(|c| format!("{} {}", c.name, c.version))
                .unwrap_or_else(|| "unknown client".to_string());
            info!(
                "Initializing session for {} (protocol {})",
                client, params.protocol_version
            );
        }

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: false },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            instructions: None,
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Run one tool call while watching the transport for its cancellation
    async fn handle_tool_call(
        &self,
        request_id: &Value,
        params: CallToolParams,
        transport: &mut dyn MCPTransport,
        pending: &mut VecDeque<MCPMessage>,
    ) -> ToolResponse {
        // A cancellation may have been queued behind this call while an
        // earlier one was running
        if let Some(position) = pending.iter().position(|m| cancels(m, request_id)) {
            pending.remove(position);
            info!("Request {} cancelled by client before it started", request_id);
            return self.registry.cancelled(&params.name, &request_id.to_string());
        }

        let call = self.registry.call_tool(&params.name, params.arguments);
        tokio::pin!(call);
        let mut input_open = true;

        loop {
            if !input_open {
                return call.await;
            }

            tokio::select! {
                response = &mut call => return response,
                incoming = transport.receive() => match incoming {
                    Ok(message) if cancels(&message, request_id) => {
                        info!("Request {} cancelled by client", request_id);
                        return self.registry.cancelled(&params.name, &request_id.to_string());
                    }
                    Ok(message) => pending.push_back(message),
                    Err(_) => input_open = false,
                },
            }
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> MCPResult<T> {
    let params = params.ok_or_else(|| ProtocolError::InvalidParams("Missing parameters".to_string()))?;
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams(e.to_string()).into())
}

fn cancels(message: &MCPMessage, request_id: &Value) -> bool {
    if !message.is_notification() || message.method.as_deref() != Some("notifications/cancelled") {
        return false;
    }

    message
        .params
        .clone()
        .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
        .is_some_and(|p| &p.request_id == request_id)
}
