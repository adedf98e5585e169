use std::path::{Path, PathBuf};

use agora_core::AllocatorConfig;
use agora_core::config::{
    ConfigSource, PROJECT_CONFIG_FILE, load_allocator_config, resolve_allocator_config,
};
use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show the effective allocator configuration and where it came from
    Show(ShowArgs),
    /// Check a config file without using it
    Validate(ValidateArgs),
    /// Write the built-in defaults to ./agora.toml
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Explicit config file (skips discovery)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ignore every file and show built-in defaults
    #[arg(long, conflicts_with = "config")]
    defaults: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    path: PathBuf,
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Overwrite an existing agora.toml
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    source: ConfigSource,
    config: AllocatorConfig,
}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    path: PathBuf,
    valid: bool,
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
        ConfigCommand::Validate(validate) => run_validate(validate, output),
        ConfigCommand::Init(init) => run_init(init, project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let (config, source) = if args.defaults {
        (AllocatorConfig::default(), ConfigSource::Defaults)
    } else {
        resolve_allocator_config(args.config.as_deref(), project_root)?
    };
    let out = ShowOutput { source, config };
    let body = toml::to_string_pretty(&out.config).context("Failed to render config as TOML")?;

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(w, "# source: {}", describe_source(&out.source))?;
            w.write_all(body.as_bytes())
        },
        |out, w| {
            pretty_section(w, "Allocator Config")?;
            pretty_kv(w, "Source", describe_source(&out.source))?;
            writeln!(w)?;
            w.write_all(body.as_bytes())
        },
    )
}

fn run_validate(args: &ValidateArgs, output: OutputMode) -> Result<()> {
    load_allocator_config(&args.path)?;
    let out = ValidateOutput {
        path: args.path.clone(),
        valid: true,
    };
    render_mode(
        output,
        &out,
        |out, w| writeln!(w, "config path={} valid={}", out.path.display(), out.valid),
        |out, w| writeln!(w, "{} is valid", out.path.display()),
    )
}

fn run_init(args: &InitArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = project_root.join(PROJECT_CONFIG_FILE);
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let body = toml::to_string_pretty(&AllocatorConfig::default())
        .context("Failed to render default config")?;
    std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;

    let out = ValidateOutput {
        path,
        valid: true,
    };
    render_mode(
        output,
        &out,
        |out, w| writeln!(w, "config written path={}", out.path.display()),
        |out, w| writeln!(w, "Wrote {}", out.path.display()),
    )
}

fn describe_source(source: &ConfigSource) -> String {
    match source {
        ConfigSource::Explicit(path) => format!("explicit {}", path.display()),
        ConfigSource::Project(path) => format!("project {}", path.display()),
        ConfigSource::User(path) => format!("user {}", path.display()),
        ConfigSource::Defaults => "built-in defaults".to_string(),
    }
}
