//! Agent module for LLM-driven build fixing
//!
//! This module provides the fix loop that orchestrates:
//! - the chat completion endpoint with tool calling
//! - concurrent execution of the requested tools
//! - the append-only transcript shared across fix attempts
//!
//! # Architecture
//!
//! ```text
//! FixAttemptContext → compose_prompt → Transcript (user turn)
//!                          ↓
//!           CompletionEndpoint (transcript + tool catalog)
//!                          ↓
//!           Assistant turn with tool calls ──none on first reply──► ProtocolViolation
//!                          ↓
//!           try_join_all(ToolExecutor::execute ...)   (fan-out / fan-in)
//!                          ↓
//!           Tool result turns, in request order
//!                          ↓
//!           CompletionEndpoint → more tool calls? loop : return Choice
//! ```

pub mod controller;
pub mod prompt;
pub mod transcript;

pub use controller::{
    AgentConfig, AgentError, FixAttemptContext, FixLoop, ProtocolViolation, DEFAULT_MODEL,
};
pub use prompt::{compose_prompt, DEFAULT_INSTRUCTIONS};
pub use transcript::{ToolOutcome, ToolRequest, Transcript, Turn};
