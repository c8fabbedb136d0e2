//! Prompt composition for a failed command

/// Default instruction block appended after the failure output
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are an expert software engineer fixing a failing build or test command.

You have access to these tools:
- read_file: read a file from the project
- write_file: replace the full contents of a file
- run_shell: run a shell command in the project root

Guidelines:
- Always start by using a tool; inspect the relevant files before changing them
- Make the smallest change that makes the command pass
- Never weaken, skip or delete tests to make them pass
- Write complete file contents with write_file, not fragments
- When you are done, reply with a short summary of what you changed and no tool calls"#;

/// Build the user prompt describing a failed command
///
/// The command, stdout and stderr are embedded verbatim, followed by
/// `instructions`.
pub fn compose_prompt(command: &str, stdout: &str, stderr: &str, instructions: &str) -> String {
    format!(
        "\nThe following command failed:\n{}\n  \nstdout:\n{}\n  \nstderr:\n{}\n\n{}",
        command, stdout, stderr, instructions
    )
}
