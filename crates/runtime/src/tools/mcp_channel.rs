//! MCP-backed session channel.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mcp::{CallToolResult, Server, ServerConfig};
use serde_json::{Map, Value};
use tracing::warn;

use super::{Channel, Payload};
use crate::catalog::RawToolRecord;
use crate::{Error, Result};

/// Channel to a tool host speaking MCP.
pub struct McpChannel {
    server: Server,
    timeout: Duration,
}

impl McpChannel {
    /// Start or reach the server and complete the handshake.
    pub async fn connect(config: ServerConfig) -> Result<Self> {
        let name = config.name.clone();
        let timeout = config.timeout;
        let server = Server::connect(config).await.map_err(|e| match e {
            mcp::Error::Timeout => Error::Timeout(timeout),
            e => Error::Connection(format!("{name}: {e}")),
        })?;
        Ok(Self { server, timeout })
    }

    fn classify(&self, error: mcp::Error, fallback: fn(String) -> Error) -> Error {
        match error {
            mcp::Error::Timeout => Error::Timeout(self.timeout),
            e if e.is_connection() => Error::Connection(format!("{}: {e}", self.server.name())),
            e => fallback(e.to_string()),
        }
    }
}

impl Channel for McpChannel {
    async fn list_tools(&self) -> Result<Vec<RawToolRecord>> {
        let records = self
            .server
            .list_tools()
            .await
            .map_err(|e| self.classify(e, Error::Protocol))?;
        Ok(records.into_iter().map(RawToolRecord::from_value).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Payload> {
        let result = self.server.call_tool(name, arguments).await.map_err(|e| match e {
            mcp::Error::ToolCallFailed(message) => Error::Tool(message),
            mcp::Error::JsonRpc(e) => Error::Tool(e.message),
            e => self.classify(e, Error::Protocol),
        })?;
        Ok(payload_of(result))
    }

    async fn close(self) {
        self.server.shutdown().await;
    }
}

/// Text blocks win; otherwise the first binary block; otherwise any
/// structured content as JSON text.
fn payload_of(result: CallToolResult) -> Payload {
    let text = result.text();
    if !text.is_empty() {
        return Payload::Text(text);
    }

    if let Some(data) = result.content.iter().find_map(|c| c.as_base64()) {
        match STANDARD.decode(data) {
            Ok(bytes) => return Payload::Bytes(bytes),
            Err(e) => warn!("tool returned undecodable binary content: {e}"),
        }
    }

    match result.structured_content {
        Some(value) => Payload::Text(value.to_string()),
        None => Payload::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(json: &str) -> CallToolResult {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn text_blocks_are_joined() {
        let payload = payload_of(result(
            r#"{"content":[{"type":"text","text":"a.txt"},{"type":"text","text":"b.pdf"}]}"#,
        ));
        assert_eq!(payload, Payload::Text("a.txt\nb.pdf".into()));
    }

    #[test]
    fn image_block_becomes_bytes() {
        let payload = payload_of(result(
            r#"{"content":[{"type":"image","data":"aGVsbG8=","mimeType":"image/png"}]}"#,
        ));
        assert_eq!(payload, Payload::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn structured_content_is_a_fallback() {
        let payload = payload_of(result(r#"{"content":[],"structuredContent":{"result":30}}"#));
        assert_eq!(payload, Payload::Text(r#"{"result":30}"#.into()));
        assert_eq!(payload_of(result("{}")), Payload::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn handshake_failure_is_a_connection_error() {
        let config = ServerConfig::stdio("mute", "sh", ["-c", "exit 0"]);
        let err = McpChannel::connect(config).await.err().unwrap();
        assert!(matches!(err, Error::Connection(_)), "unexpected error: {err}");
    }
}
