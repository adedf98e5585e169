use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use clap_complete::{Shell, generate};

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to a file instead of stdout.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

/// Generate the completion script for `agora`.
///
/// # Errors
///
/// Returns an error if the output file cannot be created or written.
pub fn run_completions(args: &CompletionsArgs, command: &mut clap::Command) -> Result<()> {
    let mut sink: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    generate(args.shell, command, "agora", &mut sink);
    sink.flush()?;
    Ok(())
}
