//! makeitpass - runs a failing build/test command and lets an LLM fix it
//!
//! The model gets the command's output and three tools (read a file, write
//! a file, run a shell command). It keeps calling tools until it answers
//! without any, then the command is run again. This repeats until the
//! command passes or the attempt limit is reached.
//!
//! # Modules
//!
//! - `agent` - fix-loop controller, transcript and prompt composer
//! - `llm` - OpenAI-compatible chat completion client
//! - `tools` - fixed tool catalog and the workspace tool executor
//! - `runner` - runs the target command and drives fix attempts
//! - `config` - layered configuration (file, environment, flags)
//! - `progress` - terminal spinner and assistant notes
//! - `metrics` - Prometheus metrics
//! - `tracing` - logging and optional OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use makeitpass::agent::{AgentConfig, FixLoop};
//! use makeitpass::llm::ChatClient;
//! use makeitpass::runner::FixSession;
//! use makeitpass::tools::WorkspaceTools;
//!
//! let client = ChatClient::new("https://openrouter.ai/api/v1", api_key);
//! let fix_loop = FixLoop::new(client, WorkspaceTools::new("."), AgentConfig::default());
//! let outcome = FixSession::new(fix_loop, "npm test", ".", 5).run().await?;
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod progress;
pub mod runner;
pub mod tools;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentError, FixAttemptContext, FixLoop};
pub use config::Config;
pub use runner::{FixSession, SessionOutcome};
