//! Tools bound to a project directory
//!
//! File paths are resolved against the workspace root and may not escape
//! it. File I/O failures are reported to the model as text so it can react;
//! only bad arguments or a shell that cannot start reject the call.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::{parse_args, ToolError, ToolExecutor, ToolInvocation, ToolKind};

/// Default cap on text returned from a shell command
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 8000;

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct RunShellArgs {
    command: String,
}

/// Read/write/shell tools rooted at a project directory
#[derive(Debug, Clone)]
pub struct WorkspaceTools {
    root: PathBuf,
    max_output_bytes: usize,
}

impl WorkspaceTools {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Resolve a model-supplied path inside the workspace
    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let requested = Path::new(path);
        let relative = if requested.is_absolute() {
            requested
                .strip_prefix(&self.root)
                .map_err(|_| ToolError::PathOutsideWorkspace(path.to_string()))?
        } else {
            requested
        };

        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(ToolError::PathOutsideWorkspace(path.to_string()));
        }

        Ok(self.root.join(relative))
    }

    async fn read_file(&self, path: &str) -> Result<String, ToolError> {
        let target = self.resolve(path)?;
        Ok(match tokio::fs::read_to_string(&target).await {
            Ok(content) => content,
            Err(e) => format!("Failed to read {}: {}", path, e),
        })
    }

    async fn write_file(&self, path: &str, content: &str, iteration: u32) -> Result<String, ToolError> {
        let target = self.resolve(path)?;

        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(format!("Failed to create directory for {}: {}", path, e));
            }
        }

        Ok(match tokio::fs::write(&target, content).await {
            Ok(()) => {
                info!(iteration, path, bytes = content.len(), "Wrote file");
                format!("Wrote {} bytes to {}", content.len(), path)
            }
            Err(e) => format!("Failed to write {}: {}", path, e),
        })
    }

    async fn run_shell(&self, command: &str) -> Result<String, ToolError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: ToolKind::RunShell.name().to_string(),
                reason: "command is empty".to_string(),
            });
        }

        let out = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(ToolError::Spawn)?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        let exit_code = out.status.code().unwrap_or(-1);
        debug!(command, exit_code, "Shell command finished");

        let mut result = String::new();
        if !stdout.is_empty() {
            result.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !result.is_empty() {
                result.push_str("\n--- stderr ---\n");
            }
            result.push_str(&stderr);
        }

        if result.is_empty() {
            result = format!("Command completed with exit code {}", exit_code);
        } else if exit_code != 0 {
            result.push_str(&format!("\n[exit code: {}]", exit_code));
        }

        Ok(truncate_output(result, self.max_output_bytes))
    }
}

impl ToolExecutor for WorkspaceTools {
    async fn execute(&self, invocation: ToolInvocation) -> Result<serde_json::Value, ToolError> {
        let kind = ToolKind::from_name(&invocation.name)
            .ok_or_else(|| ToolError::UnknownTool(invocation.name.clone()))?;

        let output = match kind {
            ToolKind::ReadFile => {
                let args: ReadFileArgs = parse_args(kind, invocation.input)?;
                self.read_file(&args.path).await?
            }
            ToolKind::WriteFile => {
                let args: WriteFileArgs = parse_args(kind, invocation.input)?;
                self.write_file(&args.path, &args.content, invocation.iteration)
                    .await?
            }
            ToolKind::RunShell => {
                let args: RunShellArgs = parse_args(kind, invocation.input)?;
                self.run_shell(&args.command).await?
            }
        };

        Ok(serde_json::Value::String(output))
    }
}

/// Truncate output at a line boundary
fn truncate_output(result: String, max_bytes: usize) -> String {
    if result.len() <= max_bytes {
        return result;
    }

    let mut cut = max_bytes;
    while !result.is_char_boundary(cut) {
        cut -= 1;
    }
    let cut = result[..cut].rfind('\n').unwrap_or(cut);
    format!(
        "{}\n\n... (truncated, {} bytes omitted)",
        &result[..cut],
        result.len() - cut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn invocation(name: &str, input: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            name: name.to_string(),
            input,
            iteration: 1,
        }
    }

    #[tokio::test]
    async fn test_read_file_returns_contents() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "module.exports = 1;\n").unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let out = tools
            .execute(invocation("read_file", json!({"path": "a.js"})))
            .await
            .unwrap();
        assert_eq!(out, json!("module.exports = 1;\n"));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_reported_as_text() {
        let dir = tempdir().unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let out = tools
            .execute(invocation("read_file", json!({"path": "nope.txt"})))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().starts_with("Failed to read nope.txt"));
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let dir = tempdir().unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let out = tools
            .execute(invocation(
                "write_file",
                json!({"path": "src/lib/util.js", "content": "ok"}),
            ))
            .await
            .unwrap();
        assert_eq!(out, json!("Wrote 2 bytes to src/lib/util.js"));
        assert_eq!(
            fs::read_to_string(dir.path().join("src/lib/util.js")).unwrap(),
            "ok"
        );
    }

    #[tokio::test]
    async fn test_write_outside_workspace_is_rejected() {
        let dir = tempdir().unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let err = tools
            .execute(invocation(
                "write_file",
                json!({"path": "../escape.txt", "content": "x"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PathOutsideWorkspace(_)));
    }

    #[tokio::test]
    async fn test_absolute_path_inside_root_is_allowed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "inside").unwrap();
        let tools = WorkspaceTools::new(dir.path());
        let absolute = dir.path().join("b.txt").display().to_string();

        let out = tools
            .execute(invocation("read_file", json!({ "path": absolute })))
            .await
            .unwrap();
        assert_eq!(out, json!("inside"));
    }

    #[tokio::test]
    async fn test_run_shell_captures_both_streams() {
        let dir = tempdir().unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let out = tools
            .execute(invocation(
                "run_shell",
                json!({"command": "echo hello; echo oops >&2; exit 3"}),
            ))
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(text.contains("hello"));
        assert!(text.contains("--- stderr ---\noops"));
        assert!(text.ends_with("[exit code: 3]"));
    }

    #[tokio::test]
    async fn test_run_shell_runs_in_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("marker.txt"), "").unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let out = tools
            .execute(invocation("run_shell", json!({"command": "ls"})))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_missing_argument_rejects() {
        let dir = tempdir().unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let err = tools
            .execute(invocation("write_file", json!({"path": "a.js"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool_rejects() {
        let dir = tempdir().unwrap();
        let tools = WorkspaceTools::new(dir.path());

        let err = tools
            .execute(invocation("format_disk", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "format_disk"));
    }

    #[test]
    fn test_truncate_output_cuts_on_line_boundary() {
        let text = "line one\nline two\nline three".to_string();
        let out = truncate_output(text, 12);
        assert!(out.starts_with("line one\n\n... (truncated"));
        assert_eq!(truncate_output("short".to_string(), 100), "short");
    }
}
