//! `agora allocate`: run one event through the pipeline against a fixed pool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agora_core::config::resolve_allocator_config;
use agora_core::random::{SeededRandom, ThreadRandom};
use agora_core::{
    AgentCandidate, AllocationResult, Clock, EventAllocator, EventPayload,
    InMemoryAgentRepository, ManualClock, RandomSource, SystemClock,
};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use tracing::debug;

use crate::cmd::read_json;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct AllocateArgs {
    /// Event payload JSON file (`-` for stdin).
    #[arg(long)]
    pub event: PathBuf,

    /// JSON array of agent candidates.
    #[arg(long)]
    pub pool: PathBuf,

    /// Queue lag in seconds reported before allocating.
    #[arg(long, default_value = "0")]
    pub lag: f64,

    /// Allocator config file. Defaults to agora.toml, then the user config.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for exploration noise. Unseeded runs use thread randomness.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Evaluate cooldowns and TTLs at this RFC 3339 instant instead of now.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}

/// Execute `agora allocate`.
///
/// # Errors
///
/// Returns an error if an input cannot be read, the config is invalid, or
/// the lag is not a finite number.
pub fn run_allocate(args: &AllocateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    if !args.lag.is_finite() {
        bail!("--lag must be a finite number of seconds");
    }
    let (config, source) = resolve_allocator_config(args.config.as_deref(), project_root)?;
    debug!(?source, "allocator config resolved");

    let event: EventPayload = read_json(&args.event)?;
    let pool: Vec<AgentCandidate> = read_json(&args.pool)?;

    let clock: Arc<dyn Clock> = match args.now {
        Some(at) => Arc::new(ManualClock::new(at)),
        None => Arc::new(SystemClock),
    };
    let random: Box<dyn RandomSource> = match args.seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(ThreadRandom),
    };

    let mut allocator = EventAllocator::in_memory(
        &config,
        Arc::new(InMemoryAgentRepository::with_pool(pool)),
        clock,
        random,
    );
    allocator.degradation_mut().report_lag(args.lag);
    let result = allocator.allocate(&event)?;

    render_mode(output, &result, write_text, write_pretty)
}

pub(crate) fn write_text(result: &AllocationResult, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "allocation event={} quota={} level={} agents={}",
        result.event_id,
        result.quota_applied,
        result.degradation_level,
        result.agents.len()
    )?;
    for agent in &result.agents {
        writeln!(
            w,
            "agent id={} priority={} score={:.3}",
            agent.agent_id, agent.priority, agent.score
        )?;
    }
    for (key, reason) in &result.skipped_reasons {
        writeln!(w, "skipped key={key} reason={reason:?}")?;
    }
    Ok(())
}

fn write_pretty(result: &AllocationResult, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Allocation {}", result.event_id))?;
    pretty_kv(w, "Quota", result.quota_applied.to_string())?;
    pretty_kv(w, "Degradation", result.degradation_level.as_str())?;
    if result.agents.is_empty() {
        pretty_kv(w, "Agents", "none")?;
    } else {
        writeln!(w)?;
        pretty_section(w, "Agents")?;
        for agent in &result.agents {
            writeln!(w, "#{:<3} {:<24} {:>7.3}", agent.priority, agent.agent_id, agent.score)?;
        }
    }
    if !result.skipped_reasons.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Skipped")?;
        for (key, reason) in &result.skipped_reasons {
            pretty_kv(w, key, reason)?;
        }
    }
    Ok(())
}
