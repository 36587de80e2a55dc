//! Tool-related types.

use std::borrow::Cow;

use serde_json::{Map, Value};

use super::ToolError;

/// A tool call ready to be sent to the tool host.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    /// Correlation id, echoed by the matching result.
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// What a tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Default for Payload {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }

    /// Text form of the payload. Binary data is summarized, never inlined.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Bytes(bytes) => Cow::Owned(format!("<{} bytes of binary data>", bytes.len())),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// The outcome of one tool call, paired with the request id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    pub id: String,
    pub payload: Payload,
    pub error: Option<ToolError>,
}

impl ToolInvocationResult {
    pub fn success(id: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: ToolError) -> Self {
        Self {
            id: id.into(),
            payload: Payload::default(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The text the model sees for this result.
    pub fn content(&self) -> Cow<'_, str> {
        match &self.error {
            Some(error) => Cow::Owned(format!("error: {error}")),
            None => self.payload.render(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_content_prefers_error() {
        let ok = ToolInvocationResult::success("1", "30");
        assert!(!ok.is_error());
        assert_eq!(ok.content(), "30");

        let failed = ToolInvocationResult::failure("2", ToolError::NotFound("mul".into()));
        assert!(failed.is_error());
        assert_eq!(failed.content(), "error: unknown tool: mul");
    }

    #[test]
    fn binary_payload_is_summarized() {
        let payload = Payload::Bytes(vec![0, 1, 2]);
        assert_eq!(payload.render(), "<3 bytes of binary data>");
        assert!(payload.as_text().is_none());
        assert!(Payload::Text("  \n".into()).is_empty());
    }
}
