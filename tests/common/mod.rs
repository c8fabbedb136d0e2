//! Scripted collaborators for driving the fix loop without a network

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use makeitpass::llm::{
    ChatError, ChatMessage, Choice, CompletionEndpoint, CompletionRequest, CompletionResponse,
    ToolCall,
};
use makeitpass::tools::{ToolError, ToolExecutor, ToolInvocation};

/// Endpoint that replays canned responses and records every request
#[derive(Clone, Default)]
pub struct ScriptedEndpoint {
    replies: Arc<Mutex<VecDeque<CompletionResponse>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedEndpoint {
    pub fn new(replies: Vec<CompletionResponse>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl CompletionEndpoint for ScriptedEndpoint {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ChatError::EmptyResponse)
    }
}

fn response(message: ChatMessage) -> CompletionResponse {
    CompletionResponse {
        id: None,
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason: None,
        }],
    }
}

/// Reply requesting the given `(id, tool, arguments)` calls
pub fn tool_reply(content: Option<&str>, calls: &[(&str, &str, &str)]) -> CompletionResponse {
    let calls = calls
        .iter()
        .map(|(id, name, args)| ToolCall::function(*id, *name, *args))
        .collect();
    response(ChatMessage::assistant(content.map(str::to_string), calls))
}

/// Reply without tool calls
pub fn text_reply(content: &str) -> CompletionResponse {
    response(ChatMessage::assistant(Some(content.to_string()), vec![]))
}

/// Executor backed by a closure, recording every invocation
pub struct FnExecutor<F> {
    f: Arc<F>,
    calls: Arc<Mutex<Vec<ToolInvocation>>>,
}

impl<F> Clone for FnExecutor<F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<F> FnExecutor<F>
where
    F: Fn(&ToolInvocation) -> Result<serde_json::Value, ToolError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f: Arc::new(f),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl<F> ToolExecutor for FnExecutor<F>
where
    F: Fn(&ToolInvocation) -> Result<serde_json::Value, ToolError> + Send + Sync,
{
    async fn execute(&self, invocation: ToolInvocation) -> Result<serde_json::Value, ToolError> {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.f)(&invocation)
    }
}

/// Executor answering every call with "ok"
pub fn ok_executor(
) -> FnExecutor<impl Fn(&ToolInvocation) -> Result<serde_json::Value, ToolError> + Send + Sync> {
    FnExecutor::new(|_: &ToolInvocation| Ok(serde_json::Value::String("ok".to_string())))
}

/// Log lines written while the returned guard is alive on this thread
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route `tracing` output into a buffer for the current thread
pub fn capture_logs() -> (tracing::subscriber::DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    (tracing::subscriber::set_default(subscriber), logs)
}
