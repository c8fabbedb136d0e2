//! Retry driver: run the target command, ask for fixes until it passes
//!
//! ```text
//! run command ──pass──► Passed
//!      │
//!     fail
//!      ▼
//! FixLoop::apply_fix(iteration) ──► run command again ... up to max_iterations
//! ```

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::agent::{AgentError, FixAttemptContext, FixLoop};
use crate::llm::CompletionEndpoint;
use crate::metrics::COMMAND_RUNS;
use crate::progress::Progress;
use crate::tools::ToolExecutor;

/// Captured result of one run of the target command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `command` through `sh -c` in `cwd`, capturing both streams
pub async fn run_command(command: &str, cwd: &Path) -> std::io::Result<CommandOutput> {
    let out = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .output()
        .await?;

    Ok(CommandOutput {
        exit_code: out.status.code(),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    })
}

/// Build the shell line for the target command
///
/// A single argument is taken as a complete shell command line, so
/// `makeitpass "npm ci && npm test"` keeps its operators. Several arguments
/// are quoted one by one, so `makeitpass -- cargo test "my case"` passes
/// `my case` through as a single word.
pub fn command_line(args: &[String]) -> String {
    match args {
        [single] => single.clone(),
        _ => shell_words::join(args),
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The command passed after `fixes` fix attempts
    Passed { fixes: u32 },
    /// Still failing after every allowed fix attempt
    GaveUp { fixes: u32, last_output: CommandOutput },
}

/// Error type for a fix session
#[derive(Debug)]
pub enum SessionError {
    /// The target command could not be started
    Spawn(std::io::Error),
    /// A fix attempt failed
    Agent(AgentError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn(e) => write!(f, "Failed to run command: {}", e),
            SessionError::Agent(e) => write!(f, "Fix attempt failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn(e) => Some(e),
            SessionError::Agent(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Spawn(e)
    }
}

impl From<AgentError> for SessionError {
    fn from(e: AgentError) -> Self {
        SessionError::Agent(e)
    }
}

/// Outer loop around a [`FixLoop`]
pub struct FixSession<E, X> {
    fix_loop: FixLoop<E, X>,
    command: String,
    workdir: PathBuf,
    max_iterations: u32,
    progress: Progress,
}

impl<E: CompletionEndpoint, X: ToolExecutor> FixSession<E, X> {
    /// # Arguments
    /// * `fix_loop` - Controller whose transcript spans the whole session
    /// * `command` - Build/test command line, run through `sh -c`
    /// * `workdir` - Directory the command runs in
    /// * `max_iterations` - Fix attempts allowed before giving up
    pub fn new(
        fix_loop: FixLoop<E, X>,
        command: impl Into<String>,
        workdir: impl Into<PathBuf>,
        max_iterations: u32,
    ) -> Self {
        Self {
            fix_loop,
            command: command.into(),
            workdir: workdir.into(),
            max_iterations,
            progress: Progress::silent(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn fix_loop(&self) -> &FixLoop<E, X> {
        &self.fix_loop
    }

    /// Run until the command passes or the fix attempts are used up
    pub async fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        info!(command = %self.command, max_iterations = self.max_iterations, "Starting fix session");

        for iteration in 1..=self.max_iterations {
            let output = self.run_target().await?;
            if output.success() {
                info!(fixes = iteration - 1, "Command passed");
                return Ok(SessionOutcome::Passed {
                    fixes: iteration - 1,
                });
            }

            let context = FixAttemptContext {
                command: self.command.clone(),
                stdout: output.stdout,
                stderr: output.stderr,
                iteration,
            };
            let choice = self.fix_loop.apply_fix(&context).await?;
            if let Some(summary) = choice.message.text() {
                self.progress.assistant_note(iteration, summary);
            }
        }

        let output = self.run_target().await?;
        if output.success() {
            info!(fixes = self.max_iterations, "Command passed");
            return Ok(SessionOutcome::Passed {
                fixes: self.max_iterations,
            });
        }

        warn!(fixes = self.max_iterations, "Giving up, command still failing");
        Ok(SessionOutcome::GaveUp {
            fixes: self.max_iterations,
            last_output: output,
        })
    }

    async fn run_target(&self) -> std::io::Result<CommandOutput> {
        let label = format!("Running {}", self.command);
        let output = self
            .progress
            .spin(&label, run_command(&self.command, &self.workdir))
            .await?;

        let result = if output.success() { "pass" } else { "fail" };
        COMMAND_RUNS.with_label_values(&[result]).inc();
        info!(command = %self.command, exit_code = ?output.exit_code, result, "Command finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_command_success() {
        let dir = tempdir().unwrap();
        let output = run_command("echo ok", dir.path()).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "ok\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_run_command_captures_failure() {
        let dir = tempdir().unwrap();
        let output = run_command("echo partial; echo 'TypeError: x is not a function' >&2; exit 2", dir.path())
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, Some(2));
        assert_eq!(output.stdout, "partial\n");
        assert!(output.stderr.contains("TypeError: x is not a function"));
    }

    #[test]
    fn test_command_line_keeps_single_argument_verbatim() {
        let args = vec!["npm ci && npm test".to_string()];
        assert_eq!(command_line(&args), "npm ci && npm test");
    }

    #[test]
    fn test_command_line_quotes_each_argument() {
        let args: Vec<String> = ["cargo", "test", "my case"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(command_line(&args), "cargo test 'my case'");
    }

    #[tokio::test]
    async fn test_quoted_argument_reaches_the_command_intact() {
        let dir = tempdir().unwrap();
        let args: Vec<String> = ["printf", "%s|", "my case", "it's"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let output = run_command(&command_line(&args), dir.path()).await.unwrap();
        assert_eq!(output.stdout, "my case|it's|");
    }

    #[tokio::test]
    async fn test_run_command_uses_cwd() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let output = run_command("test -f package.json", dir.path()).await.unwrap();
        assert!(output.success());
    }
}
