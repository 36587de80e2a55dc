//! MCP server management (connect, communicate, lifecycle).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult, RequestId,
};
use crate::transport::{Connection, Transport};

/// Default timeout for MCP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a stdio server gets to exit after its stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on `tools/list` pages, against servers that loop cursors.
const MAX_LIST_PAGES: usize = 64;

/// Configuration for an MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub transport: Transport,
    /// Bounded wait for each request/response exchange.
    pub timeout: Duration,
}

impl ServerConfig {
    /// A server launched as a subprocess.
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Stdio {
                command: command.into(),
                args: args.into_iter().map(Into::into).collect(),
                env: HashMap::new(),
                cwd: None,
            },
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A server reached over streamable HTTP.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Http { url: url.into() },
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable for a stdio server. No-op for HTTP.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Transport::Stdio { env, .. } = &mut self.transport {
            env.insert(key.into(), value.into());
        }
        self
    }

    /// Set the working directory of a stdio server. No-op for HTTP.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        if let Transport::Stdio { cwd, .. } = &mut self.transport {
            *cwd = Some(dir.into());
        }
        self
    }
}

/// Handle to a connected, initialized MCP server.
///
/// Every request holds the connection lock from write to matching read, so
/// calls issued through one handle are processed strictly one at a time.
pub struct Server {
    config: ServerConfig,
    connection: Mutex<Connection>,
    next_id: AtomicI64,
    info: Option<InitializeResult>,
}

impl Server {
    /// Start (or reach) the server and perform the initialize handshake.
    pub async fn connect(config: ServerConfig) -> Result<Self> {
        let connection = Connection::open(&config.transport)?;
        let mut server = Self {
            config,
            connection: Mutex::new(connection),
            next_id: AtomicI64::new(1),
            info: None,
        };
        server.initialize().await?;
        Ok(server)
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Info returned by the server during the handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.info.as_ref()
    }

    async fn initialize(&mut self) -> Result<()> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "initialized MCP server"
        );

        self.notify("notifications/initialized").await?;
        self.info = Some(result);
        Ok(())
    }

    /// Fetch the raw tool records, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<Value>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Call a tool by name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            let text = result.text();
            let message = if text.is_empty() {
                format!("{name} reported an error")
            } else {
                text
            };
            return Err(Error::ToolCallFailed(message));
        }

        Ok(result)
    }

    /// Shut down the server: close the pipes and stop the process, or end
    /// the HTTP session.
    pub async fn shutdown(self) {
        debug!(server = %self.config.name, "shutting down MCP server");
        self.connection.into_inner().close(SHUTDOWN_GRACE).await;
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let mut request = JsonRpcRequest::new(self.next_request_id(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let response = {
            let mut connection = self.connection.lock().await;
            timeout(self.config.timeout, connection.exchange(&request))
                .await
                .map_err(|_| Error::Timeout)??
        };

        let result_value = response.into_result()?;
        serde_json::from_value(result_value)
            .map_err(|e| Error::InvalidResponse(format!("malformed {method} result: {e}")))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let notification = JsonRpcNotification::new(method);
        let mut connection = self.connection.lock().await;
        timeout(self.config.timeout, connection.notify(&notification))
            .await
            .map_err(|_| Error::Timeout)?
    }
}
