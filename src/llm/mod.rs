//! LLM integration module
//!
//! This module provides a client for OpenAI-compatible chat completion
//! endpoints, including the tool-calling wire format.

pub mod client;
pub mod types;

// Re-export public types so callers can `use crate::llm::ChatMessage`
pub use client::{ChatClient, ChatError, CompletionEndpoint, DEFAULT_BASE_URL};
pub use types::{
    ChatMessage, Choice, CompletionRequest, CompletionResponse, FunctionCall, Tool, ToolCall,
    ToolFunction,
};
