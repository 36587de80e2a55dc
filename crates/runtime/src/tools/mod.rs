//! Tool execution and MCP integration.

mod channel;
pub mod errors;
mod mcp_channel;
mod types;

pub use channel::Channel;
pub use errors::ToolError;
pub use mcp_channel::McpChannel;
pub use types::{Payload, ToolInvocationRequest, ToolInvocationResult};
