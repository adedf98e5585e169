#![forbid(unsafe_code)]
//! agora-sim library.
//!
//! Seeded, single-process forum simulation that drives the real allocation
//! pipeline (`RuntimeLoop` over a `QueueConsumer`) with generated traffic,
//! then checks the recorded trace against allocation invariants.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod executor;
pub mod forum;
pub mod oracle;
pub mod rng;

use std::sync::{Arc, Mutex};

use agora_core::{
    AllocationResult, AllocatorConfig, AllocatorDeps, AdmissionGate, AllocationLock,
    CandidateSelector, Clock, DegradationLevel, DegradationMonitor, EventAllocator, EventPayload,
    EventQueue, InMemoryEventQueue, InMemoryStore, ManualClock, QueueConsumer, QuotaCalculator,
    RuntimeConfig, RuntimeLoop,
};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::SimExecutor;
use crate::forum::{
    AgentProfile, EventGenerator, EventMix, ForumDirectory, ForumState, SharedForum,
    generate_profiles, lock_forum,
};
use crate::rng::DeterministicRng;

/// Wall-clock start of every simulation (2023-11-14T22:13:20Z).
pub const BASE_MILLIS: i64 = 1_700_000_000_000;

/// Parameters for one seeded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub agent_count: usize,
    pub community_count: usize,
    pub rounds: u64,
    /// Root events generated per round.
    pub events_per_round: usize,
    /// Events the runtime processes per round.
    pub batch_size: usize,
    pub round_seconds: i64,
    pub mix: EventMix,
    /// Percent of root events redelivered once more in the next round.
    pub duplicate_percent: u8,
    /// Percent of agent executions that fail.
    pub executor_failure_percent: u8,
    /// Percent of agents created with a non-active status.
    pub inactive_percent: u8,
    /// Re-enqueue follow-ups for successful executions.
    pub propagate_chains: bool,
    #[serde(default)]
    pub allocator: AllocatorConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            agent_count: 24,
            community_count: 3,
            rounds: 40,
            events_per_round: 6,
            batch_size: 8,
            round_seconds: 30,
            mix: EventMix::default(),
            duplicate_percent: 10,
            executor_failure_percent: 5,
            inactive_percent: 15,
            propagate_chains: true,
            allocator: AllocatorConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if a parameter would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.agent_count == 0 {
            bail!("agent_count must be > 0");
        }
        if self.community_count == 0 {
            bail!("community_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be > 0");
        }
        if self.round_seconds <= 0 {
            bail!("round_seconds must be > 0");
        }
        let mix = self.mix;
        if u16::from(mix.post_percent) + u16::from(mix.comment_percent) + u16::from(mix.vote_percent)
            > 100
        {
            bail!("post/comment/vote percentages must not exceed 100 in total");
        }
        self.allocator
            .validate()
            .context("allocator config is invalid")?;
        Ok(())
    }
}

/// One processed event as observed by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub round: u64,
    pub processed_at_ms: i64,
    pub event: EventPayload,
    pub result: AllocationResult,
    /// Agents whose execution succeeded, in allocation order.
    pub executed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStats {
    pub events_generated: usize,
    pub duplicates_injected: usize,
    pub processed: usize,
    pub allocated_agents: usize,
    pub rejected_admission: usize,
    pub rejected_quota: usize,
    pub lock_conflicts: usize,
    pub executions_failed: usize,
    pub follow_ups: usize,
    pub peak_lag_seconds: f64,
    pub queue_remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub roster: Vec<AgentProfile>,
    pub allocator: AllocatorConfig,
    pub trace: Vec<TraceEntry>,
    pub stats: SimStats,
    pub peak_level: DegradationLevel,
    /// The run reached degradation or a lock conflict.
    pub interesting_state_reached: bool,
}

pub struct Simulator {
    config: SimulationConfig,
    clock: Arc<ManualClock>,
    forum: SharedForum,
    generator: EventGenerator,
    chaos: DeterministicRng,
    runtime: RuntimeLoop<SimExecutor>,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let seed = config.seed;
        let clock = Arc::new(ManualClock::at_millis(BASE_MILLIS));
        let mut roster_rng = DeterministicRng::fork(seed, 1);
        let profiles = generate_profiles(
            &mut roster_rng,
            config.agent_count,
            config.community_count,
            config.inactive_percent,
        );
        let forum: SharedForum = Arc::new(Mutex::new(ForumState::new(profiles)));

        let cfg = &config.allocator;
        let allocator = EventAllocator::new(AllocatorDeps {
            admission: AdmissionGate::new(cfg, InMemoryStore::shared(), clock.clone()),
            quota: QuotaCalculator::new(cfg),
            selector: CandidateSelector::new(
                cfg,
                clock.clone(),
                Box::new(DeterministicRng::fork(seed, 2)),
            ),
            lock: AllocationLock::new(cfg, InMemoryStore::shared(), clock.clone()),
            degradation: DegradationMonitor::new(cfg.degradation),
            repository: Arc::new(ForumDirectory::new(Arc::clone(&forum), clock.clone())),
        });
        let consumer = QueueConsumer::new(InMemoryEventQueue::new(), allocator, clock.clone());
        let executor = SimExecutor::new(
            Arc::clone(&forum),
            clock.clone(),
            DeterministicRng::fork(seed, 3),
            config.executor_failure_percent,
        );
        let runtime = RuntimeLoop::new(
            consumer,
            executor,
            RuntimeConfig {
                batch_size: config.batch_size,
                propagate_follow_ups: config.propagate_chains,
                ..RuntimeConfig::default()
            },
        );

        Ok(Self {
            generator: EventGenerator::new(
                DeterministicRng::fork(seed, 4),
                config.mix,
                config.community_count,
            ),
            chaos: DeterministicRng::fork(seed, 5),
            config,
            clock,
            forum,
            runtime,
        })
    }

    /// Run every round and return the trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline reports a collaborator fault, which
    /// the in-memory backends never do.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let mut trace = Vec::new();
        let mut stats = SimStats::default();
        let mut peak_level = DegradationLevel::Normal;
        let mut redeliveries: Vec<EventPayload> = Vec::new();

        for round in 0..self.config.rounds {
            let now_ms = self.clock.now_millis();

            for event in std::mem::take(&mut redeliveries) {
                self.runtime.consumer_mut().enqueue(event)?;
                stats.duplicates_injected += 1;
            }

            for _ in 0..self.config.events_per_round {
                let event = {
                    let forum = lock_forum(&self.forum);
                    self.generator.next_event(&forum, now_ms)
                };
                let Some(event) = event else { break };
                if self.chaos.hit_rate_percent(self.config.duplicate_percent) {
                    redeliveries.push(event.clone());
                }
                self.runtime.consumer_mut().enqueue(event)?;
                stats.events_generated += 1;
            }

            let report = self
                .runtime
                .tick()
                .with_context(|| format!("round {round} failed"))?;
            stats.follow_ups += report.follow_ups_enqueued;
            stats.executions_failed += report.failed;

            for processed in report.allocations {
                let result = processed.result;
                peak_level = peak_level.max(result.degradation_level);
                stats.processed += 1;
                stats.allocated_agents += result.agents.len();
                stats.rejected_admission += usize::from(result.admission_reason().is_some());
                stats.rejected_quota += usize::from(result.quota_reason().is_some());
                stats.lock_conflicts += result
                    .skipped_reasons
                    .values()
                    .filter(|r| r.as_str() == agora_core::event::LOCK_CONFLICT_REASON)
                    .count();

                let executed = report
                    .executions
                    .iter()
                    .filter(|o| o.success && o.event_id == processed.event.event_id)
                    .map(|o| o.agent_id.clone())
                    .collect();
                trace.push(TraceEntry {
                    round,
                    processed_at_ms: now_ms,
                    event: processed.event,
                    result,
                    executed,
                });
            }

            let state = self.runtime.consumer().allocator().degradation().state();
            stats.peak_lag_seconds = stats.peak_lag_seconds.max(state.queue_lag_seconds);
            peak_level = peak_level.max(state.level);
            debug!(
                round,
                queued = self.runtime.consumer().queue().len(),
                level = %state.level,
                "round complete"
            );

            self.clock.advance_secs(self.config.round_seconds);
        }

        stats.queue_remaining = self.runtime.consumer().queue().len();
        let interesting_state_reached =
            peak_level > DegradationLevel::Normal || stats.lock_conflicts > 0;

        Ok(SimulationResult {
            seed: self.config.seed,
            roster: lock_forum(&self.forum).profiles(),
            allocator: self.config.allocator.clone(),
            trace,
            stats,
            peak_level,
            interesting_state_reached,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }
}
