//! Tool-using conversation loop.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::model::{Backend, ModelError, ModelRequest, ModelResponse, ModelToolCall, ToolChoice};
use crate::session::Session;
use crate::tools::{Channel, ToolError, ToolInvocationRequest, ToolInvocationResult};

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub system_prompt: Option<String>,
    /// Tool batches allowed per user turn. The model call after the last
    /// batch may not request tools.
    pub max_tool_rounds: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tool_rounds: 1,
        }
    }
}

/// Where the agent is within a user turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentStage {
    #[default]
    AwaitingUser,
    ModelThinking,
    ToolDispatch,
    Answering,
}

/// Drives one conversation: model, tool calls, model again, answer.
///
/// The agent borrows its session, so the tool host outlives every
/// conversation using it.
pub struct Agent<'s, B, C> {
    backend: B,
    session: &'s Session<C>,
    conversation: Conversation,
    options: AgentOptions,
    stage: AgentStage,
}

impl<'s, B: Backend, C: Channel> Agent<'s, B, C> {
    pub fn new(backend: B, session: &'s Session<C>) -> Self {
        Self {
            backend,
            session,
            conversation: Conversation::new(),
            options: AgentOptions::default(),
            stage: AgentStage::AwaitingUser,
        }
    }

    pub fn with_options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(prompt.into());
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn stage(&self) -> AgentStage {
        self.stage
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer one user message, calling tools as the model asks.
    ///
    /// Never fails: model errors become an apology, tool errors are
    /// reported to the model as results.
    pub async fn respond(&mut self, input: &str) -> String {
        self.conversation.push_user(input);

        let answer = match self.run_turn().await {
            Ok(answer) => answer,
            Err(e) => {
                error!("model invocation failed: {e}");
                apology(&e)
            }
        };

        self.set_stage(AgentStage::Answering);
        self.conversation.push_assistant(answer.clone());
        self.set_stage(AgentStage::AwaitingUser);
        answer
    }

    async fn run_turn(&mut self) -> Result<String, ModelError> {
        let mut round = 0;
        loop {
            let choice = if round < self.options.max_tool_rounds {
                ToolChoice::Auto
            } else {
                ToolChoice::None
            };

            self.set_stage(AgentStage::ModelThinking);
            let response = self.invoke(choice).await?;

            if response.tool_calls.is_empty() {
                return Ok(response.content);
            }
            if choice == ToolChoice::None {
                warn!(
                    count = response.tool_calls.len(),
                    "tool rounds exhausted, ignoring requested tool calls"
                );
                return Ok(response.content);
            }

            self.set_stage(AgentStage::ToolDispatch);
            self.dispatch(response.tool_calls).await;
            round += 1;
        }
    }

    async fn invoke(&self, tool_choice: ToolChoice) -> Result<ModelResponse, ModelError> {
        let request = ModelRequest {
            system: self.options.system_prompt.as_deref(),
            turns: self.conversation.turns(),
            tools: self.session.catalog().descriptors(),
            tool_choice,
        };
        self.backend.invoke(request).await
    }

    /// Run a batch in model order, recording one request/result pair per call.
    async fn dispatch(&mut self, calls: Vec<ModelToolCall>) {
        for call in calls {
            let id = if call.id.trim().is_empty() {
                format!("call_{}", Uuid::new_v4().simple())
            } else {
                call.id
            };

            match parse_arguments(&call.arguments) {
                Ok(arguments) => {
                    let request = ToolInvocationRequest::new(id, call.name, arguments);
                    self.conversation.push_request(request.clone());
                    let result = self.session.invoke(&request).await;
                    self.conversation.push_result(result);
                }
                Err(e) => {
                    warn!(id = %id, tool = %call.name, "rejecting tool call: {e}");
                    let request = ToolInvocationRequest::new(id.clone(), call.name, Map::new());
                    self.conversation.push_request(request);
                    self.conversation.push_result(ToolInvocationResult::failure(id, e));
                }
            }
        }
    }

    fn set_stage(&mut self, stage: AgentStage) {
        debug!(from = ?self.stage, to = ?stage, "agent stage");
        self.stage = stage;
    }
}

/// Empty argument text means no arguments.
fn parse_arguments(text: &str) -> Result<Map<String, Value>, ToolError> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(text) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(ToolError::InvalidInput(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ToolError::InvalidInput(e.to_string())),
    }
}

pub(crate) fn apology(error: &ModelError) -> String {
    format!(
        "Sorry, I couldn't finish that request: {}. Please try again.",
        error.summary()
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::conversation::Turn;
    use crate::session::SessionOptions;
    use crate::testing::{ScriptedBackend, StubChannel, adder, call};

    async fn open(channel: StubChannel) -> Session<StubChannel> {
        Session::open(channel, SessionOptions::default()).await.unwrap()
    }

    fn results(agent: &Agent<'_, ScriptedBackend, StubChannel>) -> Vec<ToolInvocationResult> {
        agent
            .conversation()
            .turns()
            .iter()
            .filter_map(|turn| match turn {
                Turn::ToolResult(result) => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn adds_numbers_through_a_tool() {
        let session = open(adder()).await;
        let backend = ScriptedBackend::new()
            .calls(vec![call("c1", "add", r#"{"a": 10, "b": 20}"#)])
            .compute(|request| match request.turns.last() {
                Some(Turn::ToolResult(result)) => {
                    ModelResponse::text(format!("The sum is {}.", result.content()))
                }
                _ => ModelResponse::text("no result"),
            });
        let mut agent = Agent::new(backend, &session).with_system("You can add.");

        let answer = agent.respond("Add 10 and 20").await;
        assert_eq!(answer, "The sum is 30.");
        assert_eq!(agent.stage(), AgentStage::AwaitingUser);

        let turns = agent.conversation().turns();
        assert_eq!(turns.len(), 4);
        assert!(matches!(&turns[1], Turn::ToolRequest(r) if r.id == "c1" && r.arguments["a"] == 10));
        assert_eq!(turns[2], Turn::ToolResult(ToolInvocationResult::success("c1", "30")));
        assert_eq!(turns[3], Turn::Assistant("The sum is 30.".into()));

        let requests = agent.backend().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
        assert_eq!(requests[0].tools, ["add"]);
        assert_eq!(requests[0].system.as_deref(), Some("You can add."));
        assert_eq!(requests[1].tool_choice, ToolChoice::None);
    }

    #[tokio::test]
    async fn batch_yields_one_result_per_call() {
        let channel = adder();
        let calls = channel.calls();
        let session = open(channel).await;
        let backend = ScriptedBackend::new()
            .calls(vec![
                call("c1", "add", r#"{"a": 1, "b": 2}"#),
                call("c2", "multiply", "{}"),
                call("c3", "add", "{not json"),
                call("c4", "add", "[1, 2]"),
                call("c5", "add", r#"{"a": 5, "b": 5}"#),
            ])
            .text("partly done");
        let mut agent = Agent::new(backend, &session);

        assert_eq!(agent.respond("do many things").await, "partly done");

        let ids: Vec<_> = agent
            .conversation()
            .turns()
            .iter()
            .filter_map(|turn| match turn {
                Turn::ToolRequest(r) => Some(format!("req:{}", r.id)),
                Turn::ToolResult(r) => Some(format!("res:{}", r.id)),
                _ => None,
            })
            .collect();
        assert_eq!(
            ids,
            [
                "req:c1", "res:c1", "req:c2", "res:c2", "req:c3", "res:c3", "req:c4", "res:c4",
                "req:c5", "res:c5"
            ]
        );

        let results = results(&agent);
        assert_eq!(results[0].payload.as_text(), Some("3"));
        assert_eq!(results[1].error, Some(ToolError::NotFound("multiply".into())));
        assert!(matches!(results[2].error, Some(ToolError::InvalidInput(_))));
        assert!(matches!(results[3].error, Some(ToolError::InvalidInput(_))));
        assert_eq!(results[4].payload.as_text(), Some("10"));

        let requests = agent.backend().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].last_user(), Some("do many things"));

        assert_eq!(calls.lock().unwrap().len(), 2);
        assert!(agent.conversation().is_settled());
    }

    #[tokio::test]
    async fn missing_ids_and_empty_arguments() {
        let channel = StubChannel::new(serde_json::json!([{"name": "list_files"}]));
        let calls = channel.calls();
        let session = open(channel).await;
        let backend = ScriptedBackend::new()
            .calls(vec![call("", "list_files", "  ")])
            .text("a.txt");
        let mut agent = Agent::new(backend, &session);

        agent.respond("what files are there?").await;

        let results = results(&agent);
        assert!(results[0].id.starts_with("call_"));
        assert!(!results[0].is_error());
        assert_eq!(calls.lock().unwrap()[0], ("list_files".to_string(), Map::new()));
    }

    #[tokio::test]
    async fn direct_and_empty_answers() {
        let session = open(adder()).await;
        let backend = ScriptedBackend::new()
            .text("Hello there.")
            .reply(ModelResponse::default());
        let mut agent = Agent::new(backend, &session);

        assert_eq!(agent.respond("hi").await, "Hello there.");
        assert_eq!(agent.respond("...").await, "");
        assert_eq!(agent.conversation().len(), 4);

        let requests = agent.backend().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].turns.len(), 3);
        assert_eq!(requests[1].last_user(), Some("..."));
    }

    #[tokio::test]
    async fn model_failure_becomes_apology() {
        let session = open(adder()).await;
        let backend = ScriptedBackend::new()
            .fail(ModelError::Network("dns error: api.example.invalid".into()))
            .calls(vec![call("c1", "add", r#"{"a": 1, "b": 1}"#)])
            .fail(ModelError::Api("500 Internal Server Error: stack trace".into()));
        let mut agent = Agent::new(backend, &session);

        let answer = agent.respond("add 1 and 1").await;
        assert!(answer.contains("could not be reached"));
        assert!(!answer.contains("dns error"));
        assert_eq!(agent.conversation().last_assistant(), Some(answer.as_str()));

        let answer = agent.respond("add 1 and 1").await;
        assert!(answer.contains("rejected the request"));
        assert!(!answer.contains("stack trace"));
        assert_eq!(results(&agent).len(), 1);
        assert!(agent.conversation().is_settled());
        assert_eq!(agent.stage(), AgentStage::AwaitingUser);
    }

    #[tokio::test]
    async fn extra_rounds_then_tools_are_refused() {
        let channel = adder();
        let calls = channel.calls();
        let session = open(channel).await;
        let backend = ScriptedBackend::new()
            .calls(vec![call("c1", "add", r#"{"a": 1, "b": 2}"#)])
            .calls(vec![call("c2", "add", r#"{"a": 3, "b": 4}"#)])
            .reply(ModelResponse {
                content: "3 and 7".into(),
                tool_calls: vec![call("c3", "add", "{}")],
                ..ModelResponse::default()
            });
        let options = AgentOptions {
            max_tool_rounds: 2,
            ..AgentOptions::default()
        };
        let mut agent = Agent::new(backend, &session).with_options(options);

        assert_eq!(agent.respond("two sums").await, "3 and 7");

        let choices: Vec<_> = agent.backend().requests().iter().map(|r| r.tool_choice).collect();
        assert_eq!(choices, [ToolChoice::Auto, ToolChoice::Auto, ToolChoice::None]);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(results(&agent).len(), 2);
    }

    #[tokio::test]
    async fn silent_tool_times_out_and_turn_continues() {
        let options = SessionOptions {
            call_timeout: Duration::from_millis(20),
        };
        let session = Session::open(adder().silent(), options).await.unwrap();
        let backend = ScriptedBackend::new()
            .calls(vec![call("c1", "add", r#"{"a": 1, "b": 2}"#)])
            .text("The tool did not answer.");
        let mut agent = Agent::new(backend, &session);

        assert_eq!(agent.respond("add 1 and 2").await, "The tool did not answer.");
        assert_eq!(results(&agent)[0].error, Some(ToolError::Timeout(20)));
    }

    #[test]
    fn argument_parsing() {
        assert_eq!(parse_arguments(""), Ok(Map::new()));
        assert_eq!(parse_arguments(r#"{"path": "."}"#).unwrap()["path"], ".");
        assert!(matches!(parse_arguments("null"), Err(ToolError::InvalidInput(_))));
        assert!(matches!(parse_arguments("{"), Err(ToolError::InvalidInput(_))));
    }
}
