// Library surface shared by the binary and the tests

pub mod config;
pub mod jira;
pub mod logging;
pub mod mcp;
