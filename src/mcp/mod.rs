/// Model Context Protocol (MCP) host
///
/// JSON-RPC 2.0 over newline-delimited stdio. The server advertises the Jira
/// tool catalog and dispatches `tools/call` requests to the registry.
pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use self::{server::MCPServer, tools::ToolRegistry, transport::MCPTransport};

/// MCP Protocol version implemented by this server
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "jira-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
