//! Fix-loop controller - drives one tool-augmented chat to convergence
//!
//! The FixLoop owns the transcript for the whole run. Each `apply_fix`
//! appends a prompt describing the failed command, then alternates between
//! the completion endpoint and concurrent tool execution until the model
//! answers without requesting tools.

use std::time::Instant;

use futures_util::future::try_join_all;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::llm::{ChatError, Choice, CompletionEndpoint, CompletionRequest, CompletionResponse, Tool};
use crate::metrics::{COMPLETION_DURATION, COMPLETION_REQUESTS, FIX_ATTEMPTS, TOOL_CALLS, TOOL_ROUNDS};
use crate::progress::Progress;
use crate::tools::{catalog, ToolError, ToolExecutor, ToolInvocation};

use super::prompt::{compose_prompt, DEFAULT_INSTRUCTIONS};
use super::transcript::{ToolOutcome, ToolRequest, Transcript};

/// Model used when nothing else is configured
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Configuration for the fix loop
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier sent with every completion request
    pub model: String,
    /// Output token limit per completion
    pub max_tokens: u32,
    /// Instruction block appended to every prompt
    pub instructions: String,
    /// Tool rounds allowed per `apply_fix` (unbounded when None)
    pub max_tool_rounds: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            max_tool_rounds: None,
        }
    }
}

/// Input to one fix attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixAttemptContext {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// 1-based attempt number, supplied by the retry driver
    pub iteration: u32,
}

/// The model or a tool broke the conversation contract
#[derive(Debug)]
pub enum ProtocolViolation {
    /// First reply of a fix attempt requested no tools
    MissingToolCalls { response: String },
    /// Requested tool is not in the catalog
    UnknownTool { name: String, request_id: String },
    /// Tool arguments were not valid JSON
    MalformedArguments {
        tool: String,
        arguments: String,
        reason: String,
    },
    /// Tool resolved to something other than a string
    NonTextToolResult { tool: String, value: String },
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolViolation::MissingToolCalls { response } => {
                write!(f, "expected tool calls in response: {}", response)
            }
            ProtocolViolation::UnknownTool { name, request_id } => {
                write!(f, "model requested unknown tool '{}' (call {})", name, request_id)
            }
            ProtocolViolation::MalformedArguments {
                tool,
                arguments,
                reason,
            } => write!(
                f,
                "arguments for '{}' are not valid JSON ({}): {}",
                tool, reason, arguments
            ),
            ProtocolViolation::NonTextToolResult { tool, value } => {
                write!(f, "tool result should be string: '{}' returned {}", tool, value)
            }
        }
    }
}

/// Error type for fix attempts
#[derive(Debug)]
pub enum AgentError {
    /// Conversation contract broken
    Protocol(ProtocolViolation),
    /// Completion endpoint failed
    Endpoint(ChatError),
    /// A tool call rejected; the rest of its batch was abandoned
    Tool {
        tool: String,
        request_id: String,
        source: ToolError,
    },
    /// Safety valve tripped
    MaxToolRoundsReached(usize),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Protocol(v) => write!(f, "Protocol violation: {}", v),
            AgentError::Endpoint(e) => write!(f, "Completion endpoint error: {}", e),
            AgentError::Tool {
                tool,
                request_id,
                source,
            } => write!(f, "Tool '{}' failed (call {}): {}", tool, request_id, source),
            AgentError::MaxToolRoundsReached(max) => {
                write!(f, "Maximum tool rounds reached ({})", max)
            }
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Endpoint(e) => Some(e),
            AgentError::Tool { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ChatError> for AgentError {
    fn from(e: ChatError) -> Self {
        AgentError::Endpoint(e)
    }
}

impl From<ProtocolViolation> for AgentError {
    fn from(v: ProtocolViolation) -> Self {
        AgentError::Protocol(v)
    }
}

/// Controller driving the model and its tools to a final answer
pub struct FixLoop<E, X> {
    endpoint: E,
    executor: X,
    tools: Vec<Tool>,
    transcript: Transcript,
    config: AgentConfig,
    progress: Progress,
}

impl<E: CompletionEndpoint, X: ToolExecutor> FixLoop<E, X> {
    /// Create a controller with an empty transcript and the fixed tool catalog
    ///
    /// # Arguments
    /// * `endpoint` - Completion endpoint for the model
    /// * `executor` - Runs the tools the model asks for
    /// * `config` - Model, limits and instructions
    pub fn new(endpoint: E, executor: X, config: AgentConfig) -> Self {
        Self {
            endpoint,
            executor,
            tools: catalog(),
            transcript: Transcript::new(),
            config,
            progress: Progress::silent(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Run one fix attempt
    ///
    /// Returns the first reply that requests no tools. On any error the
    /// transcript is logged at error level before the error is returned.
    pub async fn apply_fix(&mut self, context: &FixAttemptContext) -> Result<Choice, AgentError> {
        let fix_id = Uuid::now_v7().to_string();

        let span = info_span!(
            "apply_fix",
            fix_id = %fix_id,
            iteration = context.iteration,
            model = %self.config.model,
            otel.name = "apply_fix"
        );

        let result = self.converge(context).instrument(span).await;

        match &result {
            Ok(_) => FIX_ATTEMPTS.with_label_values(&["answered"]).inc(),
            Err(e) => {
                FIX_ATTEMPTS.with_label_values(&["failed"]).inc();
                error!(
                    fix_id = %fix_id,
                    iteration = context.iteration,
                    error = %e,
                    transcript = %self.transcript.dump(),
                    "Fix attempt failed"
                );
            }
        }

        result
    }

    async fn converge(&mut self, context: &FixAttemptContext) -> Result<Choice, AgentError> {
        let prompt = compose_prompt(
            &context.command,
            &context.stdout,
            &context.stderr,
            &self.config.instructions,
        );
        self.transcript.push_user(prompt);
        info!(iteration = context.iteration, command = %context.command, "Asking the model for a fix");

        let mut reply = self.request_completion(1).await?;
        if !reply.message.has_tool_calls() {
            return Err(ProtocolViolation::MissingToolCalls {
                response: to_json(&reply),
            }
            .into());
        }

        let mut rounds = 0usize;
        loop {
            rounds += 1;

            if let Some(max) = self.config.max_tool_rounds {
                if rounds > max {
                    warn!(iteration = context.iteration, max, "Max tool rounds reached");
                    TOOL_ROUNDS.observe(max as f64);
                    return Err(AgentError::MaxToolRoundsReached(max));
                }
            }

            let requests = self.transcript.push_assistant(&reply.message);
            if let Some(text) = reply.message.text() {
                self.progress.assistant_note(context.iteration, text);
            }

            let round_span = info_span!("tool_round", round = rounds, calls = requests.len());
            let outcomes = self
                .dispatch(&requests, context.iteration)
                .instrument(round_span)
                .await?;
            self.transcript.push_tool_results(outcomes);

            reply = self.request_completion(rounds + 1).await?;
            if !reply.message.has_tool_calls() {
                self.transcript.push_assistant(&reply.message);
                TOOL_ROUNDS.observe(rounds as f64);
                info!(iteration = context.iteration, rounds, "Model finished without further tool calls");
                return Ok(reply);
            }
        }
    }

    /// Send the whole transcript and return the first choice
    async fn request_completion(&self, call: usize) -> Result<Choice, AgentError> {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: self.transcript.to_messages(),
            tools: self.tools.clone(),
        };

        let llm_span = info_span!(
            "llm_call",
            call,
            model = %self.config.model,
            messages = request.messages.len(),
            otel.name = "llm_call"
        );

        debug!(call, "Asking the model");
        COMPLETION_REQUESTS
            .with_label_values(&[&self.config.model])
            .inc();
        let start = Instant::now();

        let response = self
            .progress
            .spin("Model is thinking", self.endpoint.complete(&request))
            .instrument(llm_span)
            .await?;

        let elapsed = start.elapsed().as_secs_f64();
        COMPLETION_DURATION
            .with_label_values(&[&self.config.model])
            .observe(elapsed);
        debug!(call, duration_ms = elapsed * 1000.0, "Completion received");

        first_choice(response)
    }

    /// Validate every request, then run them all concurrently
    ///
    /// Results come back in request order. The first failure abandons the
    /// rest of the batch.
    async fn dispatch(
        &self,
        requests: &[ToolRequest],
        iteration: u32,
    ) -> Result<Vec<ToolOutcome>, AgentError> {
        let invocations = requests
            .iter()
            .map(|request| self.prepare(request, iteration))
            .collect::<Result<Vec<_>, _>>()?;

        let executor = &self.executor;
        let calls = requests.iter().zip(invocations).map(|(request, invocation)| {
            let tool_span = info_span!(
                "tool_call",
                tool = %request.tool_name,
                request_id = %request.id,
                otel.name = "tool_call"
            );

            async move {
                debug!(tool = %request.tool_name, "Model is using tool");

                let value = match executor.execute(invocation).await {
                    Ok(value) => value,
                    Err(source) => {
                        TOOL_CALLS
                            .with_label_values(&[&request.tool_name, "error"])
                            .inc();
                        warn!(tool = %request.tool_name, error = %source, "Tool call failed");
                        return Err(AgentError::Tool {
                            tool: request.tool_name.clone(),
                            request_id: request.id.clone(),
                            source,
                        });
                    }
                };

                match value {
                    serde_json::Value::String(output_text) => {
                        TOOL_CALLS
                            .with_label_values(&[&request.tool_name, "ok"])
                            .inc();
                        debug!(bytes = output_text.len(), "Tool result: {}", output_text);
                        Ok(ToolOutcome {
                            request_id: request.id.clone(),
                            output_text,
                        })
                    }
                    other => {
                        TOOL_CALLS
                            .with_label_values(&[&request.tool_name, "error"])
                            .inc();
                        Err(ProtocolViolation::NonTextToolResult {
                            tool: request.tool_name.clone(),
                            value: other.to_string(),
                        }
                        .into())
                    }
                }
            }
            .instrument(tool_span)
        });

        info!(iteration, calls = requests.len(), "Running tools");
        self.progress.spin("Running tools", try_join_all(calls)).await
    }

    /// Check the tool against the catalog and parse its arguments
    fn prepare(&self, request: &ToolRequest, iteration: u32) -> Result<ToolInvocation, AgentError> {
        if !self
            .tools
            .iter()
            .any(|tool| tool.function.name == request.tool_name)
        {
            return Err(ProtocolViolation::UnknownTool {
                name: request.tool_name.clone(),
                request_id: request.id.clone(),
            }
            .into());
        }

        let raw = request.raw_arguments.trim();
        let input = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| ProtocolViolation::MalformedArguments {
                tool: request.tool_name.clone(),
                arguments: request.raw_arguments.clone(),
                reason: e.to_string(),
            })?
        };

        Ok(ToolInvocation {
            name: request.tool_name.clone(),
            input,
            iteration,
        })
    }
}

fn first_choice(response: CompletionResponse) -> Result<Choice, AgentError> {
    if let Some(choice) = response.choices.first() {
        return Ok(choice.clone());
    }
    Err(ChatError::NoChoices {
        body: to_json(&response),
    }
    .into())
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_config_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, 4096);
        assert!(config.max_tool_rounds.is_none());
        assert!(config.instructions.contains("write_file"));
    }

    #[test]
    fn test_first_choice_rejects_empty_response() {
        let err = first_choice(CompletionResponse {
            id: None,
            choices: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::Endpoint(ChatError::NoChoices { .. })));
    }

    #[test]
    fn test_protocol_violation_message_includes_response() {
        let err: AgentError = ProtocolViolation::MissingToolCalls {
            response: r#"{"message":{"content":"done"}}"#.to_string(),
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("expected tool calls"));
        assert!(text.contains("\"content\":\"done\""));
    }
}
