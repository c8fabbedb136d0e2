//! Tool catalog offered to the model
//!
//! The catalog is closed: three tools, each a [`ToolKind`] variant with a
//! JSON-schema definition. Requests naming anything else never reach an
//! executor.
//!
//! ```text
//! ToolCall{name, arguments} ──► ToolKind::from_name ──► ToolInvocation
//!                                                          │
//!                                      ToolExecutor::execute (WorkspaceTools)
//!                                                          │
//!                                                  serde_json::Value::String
//! ```

pub mod workspace;

use std::future::Future;

use serde::de::DeserializeOwned;

use crate::llm::{Tool, ToolFunction};

pub use workspace::WorkspaceTools;

/// The tools the model may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    WriteFile,
    RunShell,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::ReadFile, ToolKind::WriteFile, ToolKind::RunShell];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ReadFile => "read_file",
            ToolKind::WriteFile => "write_file",
            ToolKind::RunShell => "run_shell",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Definition sent to the model
    pub fn definition(self) -> Tool {
        let (description, parameters) = match self {
            ToolKind::ReadFile => (
                "Read a file from the project and return its full contents.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path of the file, relative to the project root"
                        }
                    },
                    "required": ["path"]
                }),
            ),
            ToolKind::WriteFile => (
                "Write a file in the project, replacing its contents. Parent directories are created.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path of the file, relative to the project root"
                        },
                        "content": {
                            "type": "string",
                            "description": "The complete new contents of the file"
                        }
                    },
                    "required": ["path", "content"]
                }),
            ),
            ToolKind::RunShell => (
                "Run a shell command in the project root and return its stdout, stderr and exit code.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "The shell command to execute"
                        }
                    },
                    "required": ["command"]
                }),
            ),
        };

        Tool {
            tool_type: "function".to_string(),
            function: ToolFunction {
                name: self.name().to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

/// The full, fixed catalog
pub fn catalog() -> Vec<Tool> {
    ToolKind::ALL.into_iter().map(ToolKind::definition).collect()
}

/// One dispatched tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    /// Arguments parsed from the model's JSON string
    pub input: serde_json::Value,
    /// Fix attempt this call belongs to
    pub iteration: u32,
}

/// Error type for tool execution
#[derive(Debug)]
pub enum ToolError {
    UnknownTool(String),
    InvalidArguments { tool: String, reason: String },
    PathOutsideWorkspace(String),
    Spawn(std::io::Error),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::UnknownTool(name) => write!(f, "Unknown tool: {}", name),
            ToolError::InvalidArguments { tool, reason } => {
                write!(f, "Invalid arguments for {}: {}", tool, reason)
            }
            ToolError::PathOutsideWorkspace(path) => {
                write!(f, "Path is outside the workspace: {}", path)
            }
            ToolError::Spawn(e) => write!(f, "Failed to spawn shell: {}", e),
        }
    }
}

impl std::error::Error for ToolError {}

/// Executes tool invocations on behalf of the controller
///
/// Implementations must resolve to a JSON string; any other value is
/// rejected by the controller.
pub trait ToolExecutor {
    fn execute(
        &self,
        invocation: ToolInvocation,
    ) -> impl Future<Output = Result<serde_json::Value, ToolError>> + Send;
}

/// Deserialize typed arguments for `kind`
pub(crate) fn parse_args<T: DeserializeOwned>(
    kind: ToolKind,
    input: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments {
        tool: kind.name().to_string(),
        reason: e.to_string(),
    })
}
