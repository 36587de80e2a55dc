//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for communicating with MCP servers, either
//! spawned as a subprocess and spoken to over stdio, or reached over
//! streamable HTTP.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::stdio(
//!     "filesystem",
//!     "npx",
//!     ["-y", "@modelcontextprotocol/server-filesystem", "./workspace"],
//! );
//!
//! let server = Server::connect(config).await?;
//!
//! for record in server.list_tools().await? {
//!     println!("Tool: {}", record["name"]);
//! }
//!
//! let mut arguments = serde_json::Map::new();
//! arguments.insert("path".into(), "./README.md".into());
//! let result = server.call_tool("read_file", arguments).await?;
//! println!("{}", result.text());
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;
mod transport;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, ListToolsResult, PROTOCOL_VERSION,
    RequestId, ResourceContents, ServerCapabilities, ServerInfo, Tool, ToolContent,
};
pub use server::{DEFAULT_TIMEOUT, Server, ServerConfig};
pub use transport::{MAX_OUTPUT_SIZE, Transport};
