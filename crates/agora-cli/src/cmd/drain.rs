//! `agora drain`: feed a JSONL event log through the queue consumer.
//!
//! Lines are either allocator payloads or, with `--domain`, rows from the
//! forum's domain event table that go through the event bridge first.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agora_core::config::resolve_allocator_config;
use agora_core::random::{SeededRandom, ThreadRandom};
use agora_core::{
    AgentCandidate, AllocationResult, Clock, ConsumerStats, DegradationLevel, DomainEvent,
    EventAllocator, EventBridge, EventPayload, EventQueue, InMemoryAgentRepository,
    InMemoryEventQueue, ManualClock, QueueConsumer, RandomSource, SystemClock,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use crate::cmd::{read_input, read_json};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct DrainArgs {
    /// JSONL file, one event per line (`-` for stdin).
    #[arg(long)]
    pub events: PathBuf,

    /// JSON array of agent candidates.
    #[arg(long)]
    pub pool: PathBuf,

    /// Lines are domain events (`POST_CREATED`, ...) to bridge first.
    #[arg(long)]
    pub domain: bool,

    /// Process at most this many events instead of draining.
    #[arg(long)]
    pub batch: Option<usize>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Measure queue lag against this RFC 3339 instant instead of now.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct DrainOutput {
    enqueued: usize,
    not_bridged: usize,
    remaining: usize,
    level: DegradationLevel,
    stats: ConsumerStats,
    results: Vec<AllocationResult>,
}

/// Execute `agora drain`.
///
/// # Errors
///
/// Returns an error if an input line does not parse, the config is invalid,
/// or the pipeline reports a collaborator fault.
pub fn run_drain(args: &DrainArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let (config, source) = resolve_allocator_config(args.config.as_deref(), project_root)?;
    debug!(?source, "allocator config resolved");

    let pool: Vec<AgentCandidate> = read_json(&args.pool)?;
    let clock: Arc<dyn Clock> = match args.now {
        Some(at) => Arc::new(ManualClock::new(at)),
        None => Arc::new(SystemClock),
    };
    let random: Box<dyn RandomSource> = match args.seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(ThreadRandom),
    };
    let allocator = EventAllocator::in_memory(
        &config,
        Arc::new(InMemoryAgentRepository::with_pool(pool)),
        Arc::clone(&clock),
        random,
    );
    let mut consumer = QueueConsumer::new(InMemoryEventQueue::new(), allocator, clock);

    let log = read_input(&args.events)?;
    let mut enqueued = 0;
    let mut not_bridged = 0;
    for (index, line) in log.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;
        if args.domain {
            let event: DomainEvent = serde_json::from_str(line)
                .with_context(|| format!("line {line_no}: invalid domain event"))?;
            if EventBridge::bridge(consumer.queue_mut(), &event)? {
                enqueued += 1;
            } else {
                not_bridged += 1;
            }
        } else {
            let event: EventPayload = serde_json::from_str(line)
                .with_context(|| format!("line {line_no}: invalid event payload"))?;
            consumer.enqueue(event)?;
            enqueued += 1;
        }
    }

    let batch = match args.batch {
        Some(max) => consumer.process_batch(max)?,
        None => consumer.drain()?,
    };

    let out = DrainOutput {
        enqueued,
        not_bridged,
        remaining: consumer.queue().len(),
        level: consumer.allocator().degradation().state().level,
        stats: batch.stats,
        results: batch.entries.into_iter().map(|entry| entry.result).collect(),
    };
    render_mode(output, &out, write_text, write_pretty)
}

fn write_text(out: &DrainOutput, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "drain enqueued={} not_bridged={} processed={} allocated_agents={} rejected_admission={} rejected_quota={} remaining={} level={}",
        out.enqueued,
        out.not_bridged,
        out.stats.processed,
        out.stats.allocated_agents,
        out.stats.rejected_admission,
        out.stats.rejected_quota,
        out.remaining,
        out.level
    )?;
    for result in &out.results {
        super::allocate::write_text(result, w)?;
    }
    Ok(())
}

fn write_pretty(out: &DrainOutput, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Queue Drain")?;
    pretty_kv(w, "Enqueued", out.enqueued.to_string())?;
    if out.not_bridged > 0 {
        pretty_kv(w, "Not bridged", out.not_bridged.to_string())?;
    }
    pretty_kv(w, "Processed", out.stats.processed.to_string())?;
    pretty_kv(w, "Agents", out.stats.allocated_agents.to_string())?;
    pretty_kv(
        w,
        "Rejected",
        format!(
            "{} admission / {} quota",
            out.stats.rejected_admission, out.stats.rejected_quota
        ),
    )?;
    pretty_kv(w, "Remaining", out.remaining.to_string())?;
    pretty_kv(w, "Degradation", out.level.as_str())?;

    writeln!(w)?;
    pretty_section(w, "Events")?;
    for result in &out.results {
        let agents: Vec<&str> = result.agent_ids().collect();
        let summary = if agents.is_empty() {
            result
                .skipped_reasons
                .values()
                .next()
                .map_or_else(|| "no candidates".to_string(), Clone::clone)
        } else {
            agents.join(", ")
        };
        writeln!(w, "{:<28} q={:<2} {summary}", result.event_id, result.quota_applied)?;
    }
    Ok(())
}
