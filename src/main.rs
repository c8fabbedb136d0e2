use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgAction, Parser};
use crossterm::style::Stylize;

use makeitpass::config::Config;
use makeitpass::llm::ChatClient;
use makeitpass::progress::Progress;
use makeitpass::runner::{command_line, FixSession, SessionOutcome};
use makeitpass::tools::WorkspaceTools;
use makeitpass::{metrics, FixLoop};

/// Run a build/test command and let an LLM fix it until it passes
#[derive(Parser, Debug)]
#[command(name = "makeitpass", version, about)]
struct Cli {
    /// Config file (default: ./makeitpass.toml when present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Model identifier, e.g. openai/gpt-4o
    #[arg(short, long)]
    model: Option<String>,

    /// Output token limit per completion
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Fix attempts before giving up
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,

    /// Tool rounds allowed within one fix attempt
    #[arg(long)]
    max_tool_rounds: Option<usize>,

    /// Directory to run the command and the tools in
    #[arg(short = 'C', long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Export traces to this OTLP collector
    #[arg(long, value_name = "URL")]
    otlp_endpoint: Option<String>,

    /// Disable the spinner
    #[arg(long)]
    no_spinner: bool,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    print_metrics: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// The command to make pass, e.g. `npm test`
    ///
    /// One argument is run as a full shell line; several are shell-quoted
    /// individually before being joined.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

impl Cli {
    /// Flags are the last configuration layer
    fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        if let Some(max_tool_rounds) = self.max_tool_rounds {
            config.max_tool_rounds = Some(max_tool_rounds);
        }
        if let Some(endpoint) = &self.otlp_endpoint {
            config.otlp_endpoint = Some(endpoint.clone());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let workdir = match &cli.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Cannot determine the working directory")?,
    };
    let workdir = std::fs::canonicalize(&workdir)
        .with_context(|| format!("Invalid working directory {}", workdir.display()))?;

    let mut config = Config::load(cli.config.as_deref(), &workdir)?;
    cli.apply(&mut config);

    makeitpass::tracing::init_tracing("makeitpass", cli.verbose, config.otlp_endpoint.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let api_key = config.require_api_key()?.to_string();
    let progress = if cli.no_spinner || !std::io::stderr().is_terminal() {
        Progress::plain()
    } else {
        Progress::terminal()
    };

    let client = ChatClient::new(&config.base_url, api_key);
    let tools = WorkspaceTools::new(&workdir).with_max_output_bytes(config.max_tool_output_bytes);
    let fix_loop = FixLoop::new(client, tools, config.agent_config()).with_progress(progress);

    let command = command_line(&cli.command);
    let mut session = FixSession::new(fix_loop, command.clone(), &workdir, config.max_iterations)
        .with_progress(progress);

    let outcome = session.run().await;

    if cli.print_metrics {
        print!("{}", metrics::render());
    }
    makeitpass::tracing::shutdown_tracing();

    match outcome? {
        SessionOutcome::Passed { fixes: 0 } => {
            println!("{} `{}` already passes", "✔".green(), command);
            Ok(ExitCode::SUCCESS)
        }
        SessionOutcome::Passed { fixes } => {
            println!(
                "{} `{}` passes after {} fix attempt(s)",
                "✔".green(),
                command,
                fixes
            );
            Ok(ExitCode::SUCCESS)
        }
        SessionOutcome::GaveUp { fixes, last_output } => {
            if !last_output.stdout.is_empty() {
                eprintln!("{}", last_output.stdout);
            }
            if !last_output.stderr.is_empty() {
                eprintln!("{}", last_output.stderr);
            }
            eprintln!(
                "{} `{}` still fails after {} fix attempt(s)",
                "✘".red(),
                command,
                fixes
            );
            Ok(ExitCode::FAILURE)
        }
    }
}
