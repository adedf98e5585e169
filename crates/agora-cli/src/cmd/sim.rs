//! `agora sim`: deterministic forum simulation campaigns.
//!
//! `agora sim run`: execute a campaign across many seeds.
//! `agora sim replay`: replay a single seed with per-event detail.

use std::path::{Path, PathBuf};
use std::process;

use agora_core::DegradationLevel;
use agora_core::config::resolve_allocator_config;
use agora_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Drive the allocation pipeline with seeded forum traffic and check every\n\
                      trace against the allocation invariants. Reports pass/fail per seed\n\
                      and the first failure for replay.",
        after_help = "EXAMPLES:\n    # Run 50 seeds with defaults\n    agora sim run --seeds 50\n\n\
                      # Overload the queue to exercise degradation\n    agora sim run --events-per-round 24 --batch 5\n\n\
                      # Machine-readable output\n    agora sim run --seeds 50 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    agora sim replay --seed 42\n\n\
                      # Show every processed event\n    agora sim replay --seed 42 --format text"
    )]
    Replay(SimReplayArgs),
}

/// Traffic shape shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
pub struct TrafficArgs {
    /// Number of simulated agents.
    #[arg(long, default_value = "24")]
    pub agents: usize,

    #[arg(long, default_value = "3")]
    pub communities: usize,

    /// Simulation rounds per seed.
    #[arg(long, default_value = "40")]
    pub rounds: u64,

    /// Root events generated per round.
    #[arg(long, default_value = "6")]
    pub events_per_round: usize,

    /// Events processed per round.
    #[arg(long, default_value = "8")]
    pub batch: usize,

    /// Simulated seconds between rounds.
    #[arg(long, default_value = "30")]
    pub round_seconds: i64,

    /// Percent of root events redelivered.
    #[arg(long, default_value = "10")]
    pub duplicates: u8,

    /// Percent of agent executions that fail.
    #[arg(long, default_value = "5")]
    pub failures: u8,

    /// Disable follow-up propagation.
    #[arg(long)]
    pub no_chains: bool,

    /// Allocator config file. Defaults to agora.toml, then the user config.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "50")]
    pub seeds: u64,

    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub traffic: TrafficArgs,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    #[arg(long)]
    pub seed: u64,

    #[command(flatten)]
    pub traffic: TrafficArgs,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    processed: usize,
    allocated_agents: usize,
    rejected_admission: usize,
    rejected_quota: usize,
    lock_conflicts: usize,
    follow_ups: usize,
    queue_remaining: usize,
    peak_level: DegradationLevel,
    peak_lag_seconds: f64,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
}

fn build_campaign_config(
    seed_start: u64,
    seeds: u64,
    traffic: &TrafficArgs,
    project_root: &Path,
) -> Result<CampaignConfig> {
    let (allocator, _) = resolve_allocator_config(traffic.config.as_deref(), project_root)?;
    Ok(CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        agent_count: traffic.agents,
        community_count: traffic.communities,
        rounds: traffic.rounds,
        events_per_round: traffic.events_per_round,
        batch_size: traffic.batch,
        round_seconds: traffic.round_seconds,
        duplicate_percent: traffic.duplicates,
        executor_failure_percent: traffic.failures,
        propagate_chains: !traffic.no_chains,
        allocator,
        ..CampaignConfig::default()
    })
}

/// Execute `agora sim run`. Exits with status 1 if any seed fails.
///
/// # Errors
///
/// Returns an error if the config is invalid or a simulation faults.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = build_campaign_config(args.seed_start, args.seeds, &args.traffic, project_root)?;
    let report = run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        all_passed: report.all_passed(),
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "campaign seeds_run={} agents={} rounds={} events_per_round={} batch={}",
                out.seeds_run,
                args.traffic.agents,
                args.traffic.rounds,
                args.traffic.events_per_round,
                args.traffic.batch
            )?;
            writeln!(
                w,
                "results passed={} failed={} interesting_states={} all_passed={}",
                out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
            )?;
            for failure in out.failures.iter().take(5) {
                writeln!(
                    w,
                    "failure seed={} violations={}",
                    failure.seed,
                    failure.violations.len()
                )?;
            }
            if let Some(seed) = out.first_failure {
                writeln!(w, "hint replay_seed={seed}")?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, "Simulation Campaign")?;
            pretty_kv(w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(w, "Agents", args.traffic.agents.to_string())?;
            pretty_kv(w, "Rounds", args.traffic.rounds.to_string())?;
            pretty_kv(
                w,
                "Traffic",
                format!(
                    "{} events/round, batch {}",
                    args.traffic.events_per_round, args.traffic.batch
                ),
            )?;
            pretty_kv(
                w,
                "Results",
                format!(
                    "{} passed / {} failed ({} interesting)",
                    out.seeds_passed, out.seeds_failed, out.interesting_states_reached
                ),
            )?;
            if out.all_passed {
                return pretty_kv(w, "Status", "all seeds passed");
            }
            writeln!(w)?;
            pretty_section(w, "Failure Samples")?;
            for failure in out.failures.iter().take(5) {
                writeln!(w, "seed {:<8} violations={}", failure.seed, failure.violations.len())?;
                for violation in &failure.violations {
                    writeln!(w, "  - {violation}")?;
                }
            }
            if out.failures.len() > 5 {
                writeln!(w, "... and {} more failures", out.failures.len() - 5)?;
            }
            writeln!(w)?;
            pretty_kv(
                w,
                "Replay",
                format!("agora sim replay --seed {}", out.first_failure.unwrap_or(0)),
            )
        },
    )?;

    if !report.all_passed() {
        process::exit(1);
    }
    Ok(())
}

/// Execute `agora sim replay`. Exits with status 1 if the oracle fails.
///
/// # Errors
///
/// Returns an error if the config is invalid or the simulation faults.
pub fn run_sim_replay(
    args: &SimReplayArgs,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let config = build_campaign_config(args.seed, 1, &args.traffic, project_root)?;
    let trace = replay_seed(args.seed, &config)?;
    let stats = &trace.result.stats;

    let out = ReplayOutput {
        seed: args.seed,
        processed: stats.processed,
        allocated_agents: stats.allocated_agents,
        rejected_admission: stats.rejected_admission,
        rejected_quota: stats.rejected_quota,
        lock_conflicts: stats.lock_conflicts,
        follow_ups: stats.follow_ups,
        queue_remaining: stats.queue_remaining,
        peak_level: trace.result.peak_level,
        peak_lag_seconds: stats.peak_lag_seconds,
        oracle_passed: trace.oracle.passed,
        violations: trace.oracle.violations.iter().map(format_violation).collect(),
        interesting_state_reached: trace.result.interesting_state_reached,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "replay seed={} processed={} allocated_agents={} rejected_admission={} rejected_quota={} follow_ups={} peak_level={} oracle_passed={}",
                out.seed,
                out.processed,
                out.allocated_agents,
                out.rejected_admission,
                out.rejected_quota,
                out.follow_ups,
                out.peak_level,
                out.oracle_passed
            )?;
            for violation in &out.violations {
                writeln!(w, "violation={violation}")?;
            }
            for entry in &trace.result.trace {
                writeln!(
                    w,
                    "event round={} id={} depth={} quota={} level={} agents={} executed={}",
                    entry.round,
                    entry.event.event_id,
                    entry.event.chain_depth,
                    entry.result.quota_applied,
                    entry.result.degradation_level,
                    entry.result.agents.len(),
                    entry.executed.len()
                )?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(w, "Processed", out.processed.to_string())?;
            pretty_kv(w, "Agents", out.allocated_agents.to_string())?;
            pretty_kv(
                w,
                "Rejected",
                format!(
                    "{} admission / {} quota",
                    out.rejected_admission, out.rejected_quota
                ),
            )?;
            pretty_kv(w, "Lock clashes", out.lock_conflicts.to_string())?;
            pretty_kv(w, "Follow-ups", out.follow_ups.to_string())?;
            pretty_kv(w, "Backlog", out.queue_remaining.to_string())?;
            pretty_kv(
                w,
                "Peak level",
                format!("{} ({:.0}s lag)", out.peak_level, out.peak_lag_seconds),
            )?;
            pretty_kv(w, "Oracle", out.oracle_passed.to_string())?;
            if !out.oracle_passed {
                writeln!(w)?;
                pretty_section(w, "Invariant Violations")?;
                for violation in &out.violations {
                    writeln!(w, "- {violation}")?;
                }
            }
            Ok(())
        },
    )?;

    if !trace.oracle.passed {
        process::exit(1);
    }
    Ok(())
}

/// Dispatch `agora sim` subcommands.
pub fn run_sim(args: &SimArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, output, project_root),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, output, project_root),
    }
}
