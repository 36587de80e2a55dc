//! Deterministic sentinel routing.
//!
//! The model never sees tool schemas here. It answers either in prose or with
//! a one-line sentinel such as `ACTION:READ_FILE:resume.pdf`; the router
//! parses that into an [`Instruction`] and performs the file operation itself.
//! A resume read in one turn stays available to later turns through the
//! [`RouterContext`], so a pasted job description can be scored against it.

mod instruction;
pub mod prompts;

pub use instruction::{Instruction, is_job_description};

use serde_json::{Map, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::agent::apology;
use crate::conversation::Conversation;
use crate::extract::{FallbackExtractor, TextExtractor};
use crate::model::{Backend, ModelError, ModelRequest, ToolChoice};
use crate::session::Session;
use crate::tools::{Channel, ToolInvocationRequest, ToolInvocationResult};

/// Which host tools the router drives, and how it addresses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    pub list_tool: String,
    pub read_tool: String,
    /// Argument name carrying the path for both tools.
    pub path_argument: String,
    pub list_path: String,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            list_tool: "list_directory".to_string(),
            read_tool: "read_file".to_string(),
            path_argument: "path".to_string(),
            list_path: ".".to_string(),
        }
    }
}

/// A document read during this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub text: String,
}

/// State the router carries between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterContext {
    /// The most recently read document, if any text could be extracted.
    pub document: Option<Document>,
}

pub struct Router<'s, B, C> {
    backend: B,
    session: &'s Session<C>,
    conversation: Conversation,
    context: RouterContext,
    options: RouterOptions,
    extractor: Box<dyn TextExtractor>,
}

impl<'s, B: Backend, C: Channel> Router<'s, B, C> {
    pub fn new(backend: B, session: &'s Session<C>) -> Self {
        Self {
            backend,
            session,
            conversation: Conversation::new(),
            context: RouterContext::default(),
            options: RouterOptions::default(),
            extractor: Box::new(FallbackExtractor::default()),
        }
    }

    pub fn with_options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_extractor(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn context(&self) -> &RouterContext {
        &self.context
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer one user message.
    pub async fn respond(&mut self, input: &str) -> String {
        self.conversation.push_user(input);
        let answer = self.route(input).await;
        self.conversation.push_assistant(answer.clone());
        answer
    }

    async fn route(&mut self, input: &str) -> String {
        if let Some(instruction) = Instruction::direct(input) {
            debug!(?instruction, "direct request");
            return self.perform(instruction).await;
        }

        if is_job_description(input) {
            debug!("input looks like a job description");
            return self.compare_and_score(input).await;
        }

        match self.ask(prompts::ROUTING).await {
            Ok(output) => {
                let instruction = Instruction::parse(&output);
                debug!(?instruction, "model routed");
                self.perform(instruction).await
            }
            Err(e) => {
                error!("routing request failed: {e}");
                apology(&e)
            }
        }
    }

    async fn perform(&mut self, instruction: Instruction) -> String {
        match instruction {
            Instruction::List => {
                let mut arguments = Map::new();
                arguments.insert(
                    self.options.path_argument.clone(),
                    Value::String(self.options.list_path.clone()),
                );
                let tool = self.options.list_tool.clone();
                let result = self.call(&tool, arguments).await;
                self.present(&result).await
            }
            Instruction::Read(name) => {
                let result = self.read(&name).await;
                self.present(&result).await
            }
            Instruction::Analyze(name) => {
                let result = self.read(&name).await;
                let text = match &self.context.document {
                    Some(document) if !result.is_error() && document.name == name => {
                        document.text.clone()
                    }
                    _ if result.is_error() => return self.present(&result).await,
                    _ => return format!("I couldn't extract any text from {name}."),
                };
                match self.ask(&prompts::analysis(&name, &text)).await {
                    Ok(analysis) => analysis,
                    Err(e) => {
                        error!("analysis request failed: {e}");
                        apology(&e)
                    }
                }
            }
            Instruction::Text(text) => text,
        }
    }

    /// Read a document and make it the session's context. A read that yields
    /// no text clears the context.
    async fn read(&mut self, name: &str) -> ToolInvocationResult {
        let mut arguments = Map::new();
        arguments.insert(
            self.options.path_argument.clone(),
            Value::String(name.to_string()),
        );
        let tool = self.options.read_tool.clone();
        let result = self.call(&tool, arguments).await;

        if !result.is_error() {
            let text = self.extractor.extract(name, &result.payload);
            self.context.document = (!text.is_empty()).then(|| Document {
                name: name.to_string(),
                text,
            });
        }
        result
    }

    async fn call(&mut self, tool: &str, arguments: Map<String, Value>) -> ToolInvocationResult {
        let request = ToolInvocationRequest::new(
            format!("route_{}", Uuid::new_v4().simple()),
            tool,
            arguments,
        );
        self.conversation.push_request(request.clone());
        let result = self.session.invoke(&request).await;
        self.conversation.push_result(result.clone());
        result
    }

    /// Let the model phrase the tool output; fall back to the output itself.
    async fn present(&self, result: &ToolInvocationResult) -> String {
        match self.ask(prompts::PRESENT).await {
            Ok(answer) if !answer.is_empty() => answer,
            Ok(_) => result.content().into_owned(),
            Err(e) => {
                error!("presenting tool output failed: {e}");
                result.content().into_owned()
            }
        }
    }

    async fn compare_and_score(&self, job_description: &str) -> String {
        let Some(document) = &self.context.document else {
            return prompts::NO_CONTEXT.to_string();
        };
        match self.ask(&prompts::job_match(job_description, &document.text)).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("job match request failed: {e}");
                apology(&e)
            }
        }
    }

    /// One tool-free model call over the whole conversation.
    async fn ask(&self, system: &str) -> Result<String, ModelError> {
        let request = ModelRequest {
            system: Some(system),
            turns: self.conversation.turns(),
            tools: &[],
            tool_choice: ToolChoice::None,
        };
        let response = self.backend.invoke(request).await?;
        Ok(response.content.trim().to_string())
    }
}
