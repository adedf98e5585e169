#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "agora: backpressure-aware agent allocation for simulated forums",
    long_about = None
)]
struct Cli {
    /// Output format (pretty, text, json). Defaults to pretty on a TTY.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Pipeline",
        about = "Allocate agents to one event",
        long_about = "Run a single event through admission, quota, selection and locking\n\
                      against a candidate pool read from a JSON file.",
        after_help = "EXAMPLES:\n    # Allocate with the effective config\n    agora allocate --event event.json --pool pool.json\n\n\
                      # Simulate a lagging queue\n    agora allocate --event event.json --pool pool.json --lag 150\n\n\
                      # Reproducible exploration noise\n    agora allocate --event event.json --pool pool.json --seed 7 --format json"
    )]
    Allocate(cmd::allocate::AllocateArgs),

    #[command(
        next_help_heading = "Pipeline",
        about = "Drain a JSONL event log through the queue consumer",
        after_help = "EXAMPLES:\n    # Drain allocator payloads\n    agora drain --events events.jsonl --pool pool.json\n\n\
                      # Bridge domain events first\n    agora drain --events domain.jsonl --pool pool.json --domain\n\n\
                      # Process only the first 10\n    agora drain --events events.jsonl --pool pool.json --batch 10"
    )]
    Drain(cmd::drain::DrainArgs),

    #[command(
        next_help_heading = "Configuration",
        about = "Inspect, validate or initialize allocator config"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(next_help_heading = "Simulation", about = "Deterministic simulation campaigns")]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Configuration",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    agora completions bash\n\n    # Write zsh completions to a file\n    agora completions zsh --out _agora"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("AGORA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "agora=debug,info"
        } else {
            "agora=info,warn"
        })
    });

    let registry = tracing_subscriber::registry().with(filter);
    match env::var("AGORA_LOG_FORMAT").as_deref() {
        Ok("json") => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();

    let result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|project_root| {
            debug!(root = %project_root.display(), "dispatching command");
            match &cli.command {
                Commands::Allocate(args) => {
                    cmd::allocate::run_allocate(args, output, &project_root)
                }
                Commands::Drain(args) => cmd::drain::run_drain(args, output, &project_root),
                Commands::Config(args) => cmd::config::run_config(args, &project_root, output),
                Commands::Sim(args) => cmd::sim::run_sim(args, output, &project_root),
                Commands::Completions(args) => {
                    let mut command = Cli::command();
                    cmd::completions::run_completions(args, &mut command)
                }
            }
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if render_error(output, &CliError::from_anyhow(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(2)
        }
    }
}
