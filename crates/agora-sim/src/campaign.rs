//! Seed campaigns over the forum simulation.
//!
//! Runs many seeds with the same traffic shape, checks each trace with the
//! allocation oracle and remembers the first failing seed for replay.

use std::ops::Range;

use agora_core::AllocatorConfig;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::forum::EventMix;
use crate::oracle::{AllocationOracle, InvariantViolation, OracleResult};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Seeds to run and the traffic shape shared by all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub agent_count: usize,
    pub community_count: usize,
    pub rounds: u64,
    pub events_per_round: usize,
    pub batch_size: usize,
    pub round_seconds: i64,
    pub mix: EventMix,
    pub duplicate_percent: u8,
    pub executor_failure_percent: u8,
    pub inactive_percent: u8,
    pub propagate_chains: bool,
    #[serde(default)]
    pub allocator: AllocatorConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..50,
            agent_count: sim.agent_count,
            community_count: sim.community_count,
            rounds: sim.rounds,
            events_per_round: sim.events_per_round,
            batch_size: sim.batch_size,
            round_seconds: sim.round_seconds,
            mix: sim.mix,
            duplicate_percent: sim.duplicate_percent,
            executor_failure_percent: sim.executor_failure_percent,
            inactive_percent: sim.inactive_percent,
            propagate_chains: sim.propagate_chains,
            allocator: sim.allocator,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            agent_count: self.agent_count,
            community_count: self.community_count,
            rounds: self.rounds,
            events_per_round: self.events_per_round,
            batch_size: self.batch_size,
            round_seconds: self.round_seconds,
            mix: self.mix,
            duplicate_percent: self.duplicate_percent,
            executor_failure_percent: self.executor_failure_percent,
            inactive_percent: self.inactive_percent,
            propagate_chains: self.propagate_chains,
            allocator: self.allocator.clone(),
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed range is empty or the per-seed
    /// simulation config is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that reached degradation or a lock conflict.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of one seed: the oracle verdict plus whether it got interesting.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedOutcome {
    pub verdict: std::result::Result<(), Vec<InvariantViolation>>,
    pub interesting: bool,
}

/// Full trace for replaying a single seed.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation hits a
/// pipeline fault.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let outcome = run_single_seed(seed, config)?;
        report.interesting_states_reached += usize::from(outcome.interesting);

        match outcome.verdict {
            Ok(()) => report.seeds_passed += 1,
            Err(violations) => {
                warn!(seed, violations = violations.len(), "seed failed");
                report.first_failure.get_or_insert(seed);
                report.failures.push(SeedFailure {
                    seed,
                    violations: violations.iter().map(format_violation).collect(),
                });
            }
        }
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        interesting = report.interesting_states_reached,
        "campaign complete"
    );
    Ok(report)
}

/// Run a single seed through the simulator and the oracle.
///
/// # Errors
///
/// Returns an error if the simulation itself fails. Invariant violations
/// are reported in [`SeedOutcome::verdict`].
pub fn run_single_seed(seed: u64, config: &CampaignConfig) -> Result<SeedOutcome> {
    let result = Simulator::new(config.sim_config_for_seed(seed))?.run()?;
    let oracle = AllocationOracle::check_all(&result);
    Ok(SeedOutcome {
        verdict: if oracle.passed {
            Ok(())
        } else {
            Err(oracle.violations)
        },
        interesting: result.interesting_state_reached,
    })
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    let result = Simulator::new(config.sim_config_for_seed(seed))?.run()?;
    let oracle = AllocationOracle::check_all(&result);
    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::SelfAllocation { event_id, agent_id } => {
            format!("SelfAllocation: {agent_id} allocated to its own event {event_id}")
        }
        InvariantViolation::QuotaExceeded {
            event_id,
            allocated,
            quota,
        } => format!("QuotaExceeded: {event_id} allocated {allocated} agents with quota {quota}"),
        InvariantViolation::QuotaAboveCeiling {
            event_id,
            quota,
            ceiling,
            level,
        } => format!(
            "QuotaAboveCeiling: {event_id} applied quota {quota} above ceiling {ceiling} at {level}"
        ),
        InvariantViolation::PriorityGap {
            event_id,
            priorities,
        } => format!("PriorityGap: {event_id} has priorities {priorities:?}"),
        InvariantViolation::DoubleLock {
            event_id,
            agent_id,
            first_ms,
            second_ms,
        } => format!(
            "DoubleLock: {agent_id} locked twice on {event_id} \
             (first={first_ms}, second={second_ms})"
        ),
        InvariantViolation::ThreadCapExceeded {
            post_id,
            allocated,
            cap,
        } => format!("ThreadCapExceeded: {post_id} received {allocated} agents (cap {cap})"),
        InvariantViolation::DepthExceeded {
            event_id,
            chain_depth,
            max_depth,
        } => format!("DepthExceeded: {event_id} admitted at depth {chain_depth} > {max_depth}"),
        InvariantViolation::DuplicateAdmission {
            idempotency_key,
            first_ms,
            second_ms,
        } => format!(
            "DuplicateAdmission: key {idempotency_key} admitted twice \
             (first={first_ms}, second={second_ms})"
        ),
        InvariantViolation::IneligibleAgent {
            event_id,
            agent_id,
            status,
        } => format!("IneligibleAgent: {agent_id} ({}) allocated to {event_id}", status.as_str()),
        InvariantViolation::CooldownViolated {
            agent_id,
            previous_ms,
            next_ms,
            cooldown_ms,
        } => format!(
            "CooldownViolated: {agent_id} acted at {previous_ms} and {next_ms} \
             (cooldown {cooldown_ms}ms)"
        ),
    }
}
