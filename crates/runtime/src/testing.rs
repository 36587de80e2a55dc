//! Scripted model backends and stub tool hosts for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};

use crate::catalog::RawToolRecord;
use crate::conversation::Turn;
use crate::model::{Backend, ModelError, ModelRequest, ModelResponse, ModelToolCall, ToolChoice};
use crate::tools::{Channel, Payload};
use crate::{Error, Result};

/// Owned copy of what a backend was asked.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub tools: Vec<String>,
    pub tool_choice: ToolChoice,
}

impl RecordedRequest {
    fn of(request: &ModelRequest<'_>) -> Self {
        Self {
            system: request.system.map(str::to_string),
            turns: request.turns.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice: request.tool_choice,
        }
    }

    /// Text of the last user turn.
    pub fn last_user(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::User(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

type Compute = Box<dyn Fn(&RecordedRequest) -> ModelResponse + Send + Sync>;

enum Step {
    Reply(std::result::Result<ModelResponse, ModelError>),
    Compute(Compute),
}

/// Backend that replays a fixed script and records every request.
///
/// Running past the end of the script is an API error.
#[derive(Default)]
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: ModelResponse) -> Self {
        self.push(Step::Reply(Ok(response)))
    }

    pub fn text(self, content: &str) -> Self {
        self.reply(ModelResponse::text(content))
    }

    pub fn calls(self, calls: Vec<ModelToolCall>) -> Self {
        self.reply(ModelResponse::tool_calls(calls))
    }

    pub fn fail(self, error: ModelError) -> Self {
        self.push(Step::Reply(Err(error)))
    }

    pub fn compute(
        self,
        f: impl Fn(&RecordedRequest) -> ModelResponse + Send + Sync + 'static,
    ) -> Self {
        self.push(Step::Compute(Box::new(f)))
    }

    fn push(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    async fn invoke(
        &self,
        request: ModelRequest<'_>,
    ) -> std::result::Result<ModelResponse, ModelError> {
        let recorded = RecordedRequest::of(&request);
        self.requests.lock().unwrap().push(recorded.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(response)) => response,
            Some(Step::Compute(f)) => Ok(f(&recorded)),
            None => Err(ModelError::Api("script exhausted".into())),
        }
    }
}

/// Model tool call with literal argument text.
pub fn call(id: &str, name: &str, arguments: &str) -> ModelToolCall {
    ModelToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

type Handler = Arc<dyn Fn(&str, &Map<String, Value>) -> Result<Payload> + Send + Sync>;

/// Tool host served from memory.
///
/// By default a call echoes its arguments as JSON text.
#[derive(Clone)]
pub struct StubChannel {
    catalog: Value,
    handler: Handler,
    silent: bool,
    list_error: Option<fn() -> Error>,
    calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
}

impl StubChannel {
    pub fn new(catalog: Value) -> Self {
        Self {
            catalog,
            handler: Arc::new(|_: &str, arguments: &Map<String, Value>| {
                Ok(Payload::Text(Value::Object(arguments.clone()).to_string()))
            }),
            silent: false,
            list_error: None,
            calls: Arc::default(),
        }
    }

    pub fn with_handler(
        mut self,
        handler: impl Fn(&str, &Map<String, Value>) -> Result<Payload> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Never answer a tool call.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_list_error(mut self, error: fn() -> Error) -> Self {
        self.list_error = Some(error);
        self
    }

    /// Shared log of received calls, in arrival order.
    pub fn calls(&self) -> Arc<Mutex<Vec<(String, Map<String, Value>)>>> {
        Arc::clone(&self.calls)
    }
}

impl Channel for StubChannel {
    async fn list_tools(&self) -> Result<Vec<RawToolRecord>> {
        if let Some(error) = self.list_error {
            return Err(error());
        }
        Ok(RawToolRecord::from_catalog(self.catalog.clone()))
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Payload> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        if self.silent {
            std::future::pending::<()>().await;
        }
        (self.handler)(name, &arguments)
    }

    async fn close(self) {}
}

/// Host offering a single `add` tool that sums `a` and `b`.
pub fn adder() -> StubChannel {
    StubChannel::new(json!({"tools": [{
        "name": "add",
        "description": "Add two numbers",
        "inputSchema": {"type": "object", "properties": {
            "a": {"type": "number"}, "b": {"type": "number"}
        }, "required": ["a", "b"]}
    }]}))
    .with_handler(|name, arguments| {
        assert_eq!(name, "add");
        let operand = |key: &str| arguments.get(key).and_then(Value::as_f64).unwrap_or_default();
        Ok(Payload::Text((operand("a") + operand("b")).to_string()))
    })
}
