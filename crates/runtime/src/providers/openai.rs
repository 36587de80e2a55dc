//! OpenAI-compatible chat completions backend.

use crate::catalog::ToolDescriptor;
use crate::conversation::Turn;
use crate::model::{Backend, ModelError, ModelRequest, ModelResponse, ModelToolCall, Usage};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Groq's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "qwen/qwen3-32b";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseToolCall {
    #[serde(default)]
    id: String,
    function: ApiResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunction {
    name: String,
    /// Usually a JSON-encoded string, but some providers send an object.
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: f32,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: None,
            temperature: 0.0,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn build(self) -> Result<OpenAiBackend> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name is empty".into()));
        }
        Ok(OpenAiBackend {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }
}

/// Chat completions backend for OpenAI-compatible providers.
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, model)
    }

    fn tool_to_api(descriptor: &ToolDescriptor) -> ApiTool {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.parameters.clone(),
            },
        }
    }
}

/// Render the transcript as chat messages.
///
/// Consecutive tool requests form one assistant message. Without tools on
/// offer the provider rejects tool messages, so tool traffic is rendered as
/// plain text instead.
fn to_api_messages(system: Option<&str>, turns: &[Turn], tools_offered: bool) -> Vec<ApiMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if let Some(system) = system {
        messages.push(ApiMessage::text("system", system));
    }

    let mut batching = false;
    for turn in turns {
        match turn {
            Turn::User(text) => messages.push(ApiMessage::text("user", text.as_str())),
            Turn::Assistant(text) => messages.push(ApiMessage::text("assistant", text.as_str())),
            Turn::ToolRequest(request) if tools_offered => {
                let call = ApiToolCall {
                    id: request.id.clone(),
                    call_type: "function",
                    function: ApiFunctionCall {
                        name: request.name.clone(),
                        arguments: Value::Object(request.arguments.clone()).to_string(),
                    },
                };
                match messages.last_mut() {
                    Some(last) if batching => last.tool_calls.push(call),
                    _ => messages.push(ApiMessage {
                        role: "assistant",
                        content: None,
                        tool_calls: vec![call],
                        tool_call_id: None,
                    }),
                }
                batching = true;
                continue;
            }
            Turn::ToolResult(result) if tools_offered => messages.push(ApiMessage {
                role: "tool",
                content: Some(result.content().into_owned()),
                tool_calls: Vec::new(),
                tool_call_id: Some(result.id.clone()),
            }),
            Turn::ToolRequest(request) => messages.push(ApiMessage::text(
                "assistant",
                format!(
                    "Calling tool {} with {}",
                    request.name,
                    Value::Object(request.arguments.clone())
                ),
            )),
            Turn::ToolResult(result) => messages.push(ApiMessage::text(
                "user",
                format!("Tool result:\n{}", result.content()),
            )),
        }
        batching = false;
    }
    messages
}

fn parse_response(response: ApiResponse) -> std::result::Result<ModelResponse, ModelError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ModelToolCall {
            id: call.id,
            name: call.function.name,
            arguments: match call.function.arguments {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            },
        })
        .collect();

    let usage = response.usage.unwrap_or_default();
    Ok(ModelResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        usage: Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    })
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({}, {})", self.model, self.endpoint)
    }
}

impl Backend for OpenAiBackend {
    async fn invoke(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<ModelResponse, ModelError> {
        let tools: Vec<ApiTool> = request.tools.iter().map(Self::tool_to_api).collect();
        let tool_choice = (!tools.is_empty()).then(|| request.tool_choice.as_str());

        let api_request = ApiRequest {
            model: self.model.clone(),
            messages: to_api_messages(request.system, request.turns, !tools.is_empty()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools,
            tool_choice,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        parse_response(api_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolError, ToolInvocationRequest, ToolInvocationResult};
    use serde_json::{Map, json};

    fn request(id: &str) -> Turn {
        let mut arguments = Map::new();
        arguments.insert("a".into(), json!(10));
        Turn::ToolRequest(ToolInvocationRequest::new(id, "add", arguments))
    }

    #[test]
    fn tool_requests_are_batched() {
        let turns = vec![
            Turn::User("add twice".into()),
            request("c1"),
            request("c2"),
            Turn::ToolResult(ToolInvocationResult::success("c1", "30")),
            Turn::ToolResult(ToolInvocationResult::failure("c2", ToolError::Timeout(5))),
            Turn::Assistant("done".into()),
        ];
        let messages = to_api_messages(Some("be brief"), &turns, true);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "assistant", "tool", "tool", "assistant"]);

        let batch = &messages[2];
        assert_eq!(batch.content, None);
        assert_eq!(batch.tool_calls.len(), 2);
        assert_eq!(batch.tool_calls[1].function.arguments, r#"{"a":10}"#);

        assert_eq!(messages[4].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(messages[4].content.as_deref(), Some("error: timeout after 5ms"));
    }

    #[test]
    fn tool_traffic_is_text_without_tools() {
        let turns = vec![
            request("c1"),
            Turn::ToolResult(ToolInvocationResult::success("c1", "30")),
        ];
        let messages = to_api_messages(None, &turns, false);
        assert!(messages.iter().all(|m| m.tool_calls.is_empty() && m.tool_call_id.is_none()));
        assert_eq!(messages[1].content.as_deref(), Some("Tool result:\n30"));
    }

    #[test]
    fn request_wire_format() {
        let descriptor = ToolDescriptor {
            name: "add".into(),
            description: "Add".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        };
        let request = ApiRequest {
            model: "m".into(),
            messages: vec![ApiMessage::text("user", "hi")],
            max_tokens: None,
            temperature: 0.0,
            tools: vec![OpenAiBackend::tool_to_api(&descriptor)],
            tool_choice: Some("none"),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "add");
        assert_eq!(value["tool_choice"], "none");
        assert!(value.get("max_tokens").is_none());
        assert_eq!(value["messages"][0], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn parses_tool_calls() {
        let response: ApiResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "add", "arguments": "{\"a\":10,\"b\":20}"}},
                {"id": "c2", "type": "function", "function": {"name": "add", "arguments": {"a": 1}}},
                {"type": "function", "function": {"name": "list"}}
            ]}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }))
        .unwrap();
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.content, "");
        assert_eq!(parsed.tool_calls[0].arguments, r#"{"a":10,"b":20}"#);
        assert_eq!(parsed.tool_calls[1].arguments, r#"{"a":1}"#);
        assert_eq!(parsed.tool_calls[2].id, "");
        assert_eq!(parsed.tool_calls[2].arguments, "");
        assert_eq!(parsed.usage.input_tokens, 12);
    }

    #[test]
    fn parses_plain_answer_and_rejects_empty() {
        let response: ApiResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "30", "tool_calls": null}}]
        }))
        .unwrap();
        assert_eq!(parse_response(response).unwrap(), ModelResponse::text("30"));

        let empty: ApiResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(parse_response(empty), Err(ModelError::InvalidResponse(_))));
    }

    #[test]
    fn builder_rejects_missing_key() {
        assert!(matches!(OpenAiBackend::builder("", DEFAULT_MODEL).build(), Err(Error::Config(_))));
        let backend = OpenAiBackend::builder("k", "m")
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(backend.to_string(), "openai(m, http://localhost:8080/v1/chat/completions)");
    }
}
