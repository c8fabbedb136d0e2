//! Append-only conversation transcript
//!
//! One transcript lives for one process run, owned by a single
//! [`FixLoop`](super::FixLoop). Turns are only ever appended, so the model
//! always sees the causal order of prompts, requests and results.

use serde::Serialize;

use crate::llm::{ChatMessage, ToolCall};

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolRequest {
    /// Unique within its assistant turn
    pub id: String,
    pub tool_name: String,
    /// JSON-encoded arguments, as produced by the model
    pub raw_arguments: String,
}

impl From<&ToolCall> for ToolRequest {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            tool_name: call.function.name.clone(),
            raw_arguments: call.function.arguments.clone(),
        }
    }
}

/// Text produced by one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub request_id: String,
    pub output_text: String,
}

/// One unit of the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant {
        text: Option<String>,
        tool_requests: Vec<ToolRequest>,
    },
    ToolResult {
        request_id: String,
        output_text: String,
    },
}

impl Turn {
    /// Wire representation for the completion endpoint
    pub fn to_message(&self) -> ChatMessage {
        match self {
            Turn::User { text } => ChatMessage::user(text.clone()),
            Turn::Assistant {
                text,
                tool_requests,
            } => ChatMessage::assistant(
                text.clone(),
                tool_requests
                    .iter()
                    .map(|r| ToolCall::function(&r.id, &r.tool_name, &r.raw_arguments))
                    .collect(),
            ),
            Turn::ToolResult {
                request_id,
                output_text,
            } => ChatMessage::tool(request_id.clone(), output_text.clone()),
        }
    }
}

/// Ordered, append-only conversation history
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::User { text: text.into() });
    }

    /// Append an assistant reply and return the tool requests it carries
    pub fn push_assistant(&mut self, message: &ChatMessage) -> Vec<ToolRequest> {
        let tool_requests: Vec<ToolRequest> = message
            .tool_calls
            .iter()
            .flatten()
            .map(ToolRequest::from)
            .collect();
        self.turns.push(Turn::Assistant {
            text: message.content.clone(),
            tool_requests: tool_requests.clone(),
        });
        tool_requests
    }

    /// Append one result turn per outcome, preserving their order
    pub fn push_tool_results(&mut self, outcomes: Vec<ToolOutcome>) {
        self.turns
            .extend(outcomes.into_iter().map(|outcome| Turn::ToolResult {
                request_id: outcome.request_id,
                output_text: outcome.output_text,
            }));
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

    /// Messages to send to the completion endpoint
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.turns.iter().map(Turn::to_message).collect()
    }

    /// Pretty JSON of every turn, for diagnostics
    pub fn dump(&self) -> String {
        serde_json::to_string_pretty(&self.turns)
            .unwrap_or_else(|e| format!("<transcript could not be serialized: {}>", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant_with_calls() -> ChatMessage {
        ChatMessage::assistant(
            Some("Let me look".to_string()),
            vec![
                ToolCall::function("call_1", "read_file", r#"{"path":"a.js"}"#),
                ToolCall::function("call_2", "run_shell", r#"{"command":"ls"}"#),
            ],
        )
    }

    #[test]
    fn test_push_assistant_returns_requests_in_order() {
        let mut transcript = Transcript::new();
        let requests = transcript.push_assistant(&assistant_with_calls());

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].id, "call_1");
        assert_eq!(requests[1].tool_name, "run_shell");
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn test_wire_messages_pair_results_with_calls() {
        let mut transcript = Transcript::new();
        transcript.push_user("fix it");
        transcript.push_assistant(&assistant_with_calls());
        transcript.push_tool_results(vec![
            ToolOutcome {
                request_id: "call_1".to_string(),
                output_text: "contents".to_string(),
            },
            ToolOutcome {
                request_id: "call_2".to_string(),
                output_text: "a.js".to_string(),
            },
        ]);

        let messages = transcript.to_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].tool_calls.as_ref().unwrap().len(), 2);
        assert_eq!(messages[2].role, "tool");
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_2"));
    }

    #[test]
    fn test_assistant_without_calls_has_no_tool_calls_field() {
        let mut transcript = Transcript::new();
        transcript.push_assistant(&ChatMessage::assistant(Some("done".to_string()), vec![]));

        let message = &transcript.to_messages()[0];
        assert!(message.tool_calls.is_none());
        assert_eq!(message.content.as_deref(), Some("done"));
    }

    #[test]
    fn test_dump_is_tagged_json() {
        let mut transcript = Transcript::new();
        transcript.push_user("npm test failed");

        let dump = transcript.dump();
        assert!(dump.contains("\"kind\": \"user\""));
        assert!(dump.contains("npm test failed"));
    }
}
