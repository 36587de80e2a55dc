//! Tether runtime: tool sessions and conversation loops.
//!
//! This crate connects a language model to the tools of one MCP host and
//! runs conversations over them.
//!
//! # Overview
//!
//! - **Catalog**: tool descriptors translated from whatever shape the host
//!   advertises into one canonical form.
//! - **Session**: a tool-host channel plus its catalog. Tool calls never
//!   fail; errors come back as results the model can read.
//! - **Agent**: the tool-calling loop. The model sees every tool, requests
//!   calls, and answers from their results.
//! - **Router**: the model answers with sentinels only and the router runs
//!   the file operations itself.
//! - **Backend**: a trait over LLM providers, with an OpenAI-compatible
//!   implementation.
//!
//! # Example
//!
//! ```no_run
//! use mcp::ServerConfig;
//! use runtime::{Agent, OpenAiBackend, Session, SessionOptions};
//!
//! # async fn example() -> runtime::Result<()> {
//! let config = ServerConfig::stdio(
//!     "filesystem",
//!     "npx",
//!     ["-y", "@modelcontextprotocol/server-filesystem", "."],
//! );
//! let session = Session::connect(config, SessionOptions::default()).await?;
//! let backend = OpenAiBackend::builder("gsk_...", "qwen/qwen3-32b").build()?;
//!
//! let mut agent = Agent::new(backend, &session);
//! println!("{}", agent.respond("Which files are in this folder?").await);
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod catalog;
pub mod conversation;
mod error;
pub mod extract;
pub mod model;
mod providers;
pub mod router;
mod session;
pub mod tools;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentOptions, AgentStage};
pub use catalog::{Catalog, RawToolRecord, ToolDescriptor};
pub use conversation::{Conversation, Turn};
pub use error::{Error, Result};
pub use extract::{FallbackExtractor, PlainTextExtractor, TextExtractor};
pub use model::{Backend, ModelError, ModelRequest, ModelResponse, ModelToolCall, ToolChoice};
pub use providers::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiBackend, OpenAiBackendBuilder};
pub use router::{Document, Instruction, Router, RouterContext, RouterOptions};
pub use session::{DEFAULT_CALL_TIMEOUT, Session, SessionOptions};
pub use tools::{
    Channel, McpChannel, Payload, ToolError, ToolInvocationRequest, ToolInvocationResult,
};
