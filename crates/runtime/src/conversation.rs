//! Ordered turn history of one interaction.

use crate::tools::{ToolInvocationRequest, ToolInvocationResult};

/// One entry in the history.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    User(String),
    Assistant(String),
    ToolRequest(ToolInvocationRequest),
    ToolResult(ToolInvocationResult),
}

/// Append-only turn history.
///
/// Every [`Turn::ToolResult`] answers an earlier [`Turn::ToolRequest`] with
/// the same id, and a new user turn is only accepted once every request has
/// been answered.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        debug_assert!(self.is_settled(), "user turn with unanswered tool requests");
        self.turns.push(Turn::User(text.into()));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Assistant(text.into()));
    }

    pub fn push_request(&mut self, request: ToolInvocationRequest) {
        self.turns.push(Turn::ToolRequest(request));
    }

    pub fn push_result(&mut self, result: ToolInvocationResult) {
        debug_assert!(
            self.pending_requests().any(|r| r.id == result.id),
            "tool result {} answers no pending request",
            result.id
        );
        self.turns.push(Turn::ToolResult(result));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Requests that have no result yet, in request order.
    pub fn pending_requests(&self) -> impl Iterator<Item = &ToolInvocationRequest> {
        self.turns.iter().enumerate().filter_map(|(i, turn)| match turn {
            Turn::ToolRequest(request) => {
                let answered = self.turns[i + 1..]
                    .iter()
                    .any(|t| matches!(t, Turn::ToolResult(r) if r.id == request.id));
                (!answered).then_some(request)
            }
            _ => None,
        })
    }

    pub fn is_settled(&self) -> bool {
        self.pending_requests().next().is_none()
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Assistant(text) => Some(text.as_str()),
            _ => None,
        })
    }
}
