//! Wire transports: newline-delimited JSON over a child's stdio, or
//! streamable HTTP.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, RequestId};

/// Maximum size of a single message (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const SESSION_HEADER: &str = "mcp-session-id";
const EVENT_STREAM: &str = "text/event-stream";

/// How to reach a tool host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Spawn `command` and speak JSON-RPC over its stdin/stdout.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        cwd: Option<PathBuf>,
    },
    /// POST JSON-RPC messages to a streamable HTTP endpoint.
    Http { url: String },
}

/// An open connection. Exactly one exchange runs at a time; the owner holds
/// it behind a lock.
pub(crate) enum Connection {
    Stdio(StdioConnection),
    Http(HttpConnection),
}

impl Connection {
    pub(crate) fn open(transport: &Transport) -> Result<Self> {
        match transport {
            Transport::Stdio {
                command,
                args,
                env,
                cwd,
            } => StdioConnection::spawn(command, args, env, cwd.as_ref()).map(Self::Stdio),
            Transport::Http { url } => Ok(Self::Http(HttpConnection::new(url))),
        }
    }

    /// Send a request and wait for the message answering it.
    pub(crate) async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcMessage> {
        match self {
            Self::Stdio(conn) => conn.exchange(request).await,
            Self::Http(conn) => conn.exchange(request).await,
        }
    }

    /// Send a message that expects no answer.
    pub(crate) async fn notify(&mut self, notification: &impl Serialize) -> Result<()> {
        match self {
            Self::Stdio(conn) => conn.write_message(notification).await,
            Self::Http(conn) => conn.post(notification).await.map(drop),
        }
    }

    pub(crate) async fn close(self, grace: Duration) {
        match self {
            Self::Stdio(conn) => conn.close(grace).await,
            Self::Http(conn) => conn.close().await,
        }
    }
}

// --- stdio ---

pub(crate) struct StdioConnection {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StdioConnection {
    fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&PathBuf>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        debug!(command, pid = process.id(), "spawned tool host");

        Ok(Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcMessage> {
        self.write_message(request).await?;

        loop {
            let message = self.read_message().await?;
            if message.answers(&request.id) {
                return Ok(message);
            }
            match (&message.method, &message.id) {
                (Some(method), Some(id)) => self.answer_server_request(method, id.clone()).await?,
                (Some(method), None) => trace!(method, "ignoring server notification"),
                (None, id) => debug!(?id, "skipping stale response"),
            }
        }
    }

    async fn write_message(&mut self, message: &impl Serialize) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.stdin.write_all(json.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<JsonRpcMessage> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = self.stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Err(Error::ServerExited);
            }

            if line.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: line.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(message) => return Ok(message),
                Err(e) => warn!("skipping non JSON-RPC output from tool host: {e}"),
            }
        }
    }

    /// Servers may ping the client or ask for capabilities it never
    /// advertised. Pings get an empty result, everything else "method not
    /// found".
    async fn answer_server_request(&mut self, method: &str, id: RequestId) -> Result<()> {
        debug!(method, "answering server request");
        let reply = if method == "ping" {
            serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": {} })
        } else {
            let error = JsonRpcError {
                code: -32601,
                message: format!("method not found: {method}"),
                data: None,
            };
            serde_json::json!({ "jsonrpc": "2.0", "id": id, "error": error })
        };
        self.write_message(&reply).await
    }

    async fn close(self, grace: Duration) {
        let Self {
            mut process,
            stdin,
            stdout,
        } = self;
        // Closing stdin is the polite shutdown signal for stdio servers.
        drop(stdin);
        drop(stdout);

        match tokio::time::timeout(grace, process.wait()).await {
            Ok(Ok(status)) => debug!(%status, "tool host exited"),
            _ => {
                let _ = process.kill().await;
                debug!("tool host killed");
            }
        }
    }
}

// --- streamable HTTP ---

pub(crate) struct HttpConnection {
    client: reqwest::Client,
    url: String,
    session_id: Option<String>,
}

impl HttpConnection {
    fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            session_id: None,
        }
    }

    async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcMessage> {
        let response = self.post(request).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Err(Error::InvalidResponse(format!(
                "no response body for {}",
                request.method
            )));
        }

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(EVENT_STREAM));

        let body = response.text().await?;
        if body.len() > MAX_OUTPUT_SIZE {
            return Err(Error::OutputTooLarge {
                size: body.len(),
                max: MAX_OUTPUT_SIZE,
            });
        }

        let messages = if is_stream {
            parse_event_stream(&body)
        } else {
            parse_json_body(&body)?
        };

        messages
            .into_iter()
            .find(|m| m.answers(&request.id))
            .ok_or_else(|| {
                Error::InvalidResponse(format!("no answer to {} in response", request.method))
            })
    }

    async fn post(&mut self, message: &impl Serialize) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(&self.url)
            .header(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"))
            .json(message);
        if let Some(session_id) = &self.session_id {
            req = req.header(SESSION_HEADER, session_id);
        }

        let response = req.send().await?;

        if let Some(session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidResponse(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn close(self) {
        let Some(session_id) = self.session_id else {
            return;
        };
        let _ = self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, session_id)
            .send()
            .await;
    }
}

fn parse_json_body(body: &str) -> Result<Vec<JsonRpcMessage>> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let messages = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(messages)
}

/// Collect the JSON-RPC messages carried by the `data:` fields of an SSE
/// body. Events whose data is not a JSON-RPC message are dropped.
pub(crate) fn parse_event_stream(body: &str) -> Vec<JsonRpcMessage> {
    let mut messages = Vec::new();
    let mut data = String::new();

    let mut flush = |data: &mut String| {
        if data.is_empty() {
            return;
        }
        match serde_json::from_str(data) {
            Ok(message) => messages.push(message),
            Err(e) => trace!("dropping SSE event: {e}"),
        }
        data.clear();
    };

    for line in body.lines() {
        if line.is_empty() {
            flush(&mut data);
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data);

    messages
}
