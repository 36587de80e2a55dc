//! Tool-host sessions.

use std::time::Duration;

use mcp::ServerConfig;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::tools::{Channel, McpChannel, ToolError, ToolInvocationRequest, ToolInvocationResult};
use crate::{Error, Result};

/// Default bound on a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Upper bound on each tool call, enforced around the channel.
    pub call_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// One tool-host channel plus the catalog discovered when it was opened.
///
/// The session owns the channel; dropping or closing it releases the host.
/// Calls take `&self`, so several conversations may share one session.
pub struct Session<C> {
    channel: C,
    catalog: Catalog,
    options: SessionOptions,
}

impl Session<McpChannel> {
    /// Start or reach an MCP server and discover its tools.
    pub async fn connect(config: ServerConfig, options: SessionOptions) -> Result<Self> {
        let channel = McpChannel::connect(config).await.map_err(unanswered)?;
        Self::open(channel, options).await.map_err(unanswered)
    }
}

/// A host that stays silent while the session starts counts as unreachable.
fn unanswered(error: Error) -> Error {
    match error {
        Error::Timeout(limit) => Error::Connection(format!("no answer within {limit:?}")),
        e => e,
    }
}

impl<C: Channel> Session<C> {
    /// Discover the catalog over an already connected channel.
    ///
    /// A malformed catalog leaves the session usable with no tools; any other
    /// failure closes the channel and is returned.
    pub async fn open(channel: C, options: SessionOptions) -> Result<Self> {
        let catalog = match channel.list_tools().await {
            Ok(records) => Catalog::translate(records),
            Err(Error::Protocol(message)) => {
                warn!("tool catalog unreadable, continuing without tools: {message}");
                Catalog::default()
            }
            Err(e) => {
                channel.close().await;
                return Err(e);
            }
        };
        debug!(tools = catalog.len(), "session opened");

        Ok(Self {
            channel,
            catalog,
            options,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Re-list the host's tools and rebuild the catalog.
    pub async fn refresh(&mut self) -> Result<()> {
        let records = self.channel.list_tools().await?;
        self.catalog = Catalog::translate(records);
        Ok(())
    }

    /// Execute one tool call. Failures come back inside the result.
    pub async fn invoke(&self, request: &ToolInvocationRequest) -> ToolInvocationResult {
        if !self.catalog.contains(&request.name) {
            warn!(tool = %request.name, "model requested an unknown tool");
            return ToolInvocationResult::failure(
                &request.id,
                ToolError::NotFound(request.name.clone()),
            );
        }

        debug!(id = %request.id, tool = %request.name, "invoking tool");
        let limit = self.options.call_timeout;
        let call = self
            .channel
            .call_tool(&request.name, request.arguments.clone());

        let error = match tokio::time::timeout(limit, call).await {
            Ok(Ok(payload)) => return ToolInvocationResult::success(&request.id, payload),
            Err(_) | Ok(Err(Error::Timeout(_))) => ToolError::Timeout(limit.as_millis() as u64),
            Ok(Err(Error::Tool(message))) => ToolError::Execution(message),
            Ok(Err(e)) => ToolError::Execution(e.to_string()),
        };
        warn!(id = %request.id, tool = %request.name, "tool call failed: {error}");
        ToolInvocationResult::failure(&request.id, error)
    }

    /// Release the tool host.
    pub async fn close(self) {
        self.channel.close().await;
    }
}
