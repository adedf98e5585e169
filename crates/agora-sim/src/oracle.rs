use std::collections::{BTreeMap, HashMap};

use agora_core::{AgentStatus, AllocatorConfig, DegradationLevel};
use serde::Serialize;

use crate::{SimulationResult, TraceEntry};

// ── Core result types ─────────────────────────────────────────────────────────

/// Oracle result for an invariant check.
///
/// Returned by each invariant checker and by [`AllocationOracle::check_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        if violations.is_empty() {
            Self::pass()
        } else {
            Self {
                passed: false,
                violations,
            }
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// An event's author was allocated to respond to it.
    SelfAllocation { event_id: String, agent_id: String },

    /// More agents were allocated than the applied quota.
    QuotaExceeded {
        event_id: String,
        allocated: usize,
        quota: u32,
    },

    /// The applied quota exceeds the configured ceiling for its level.
    QuotaAboveCeiling {
        event_id: String,
        quota: u32,
        ceiling: u32,
        level: DegradationLevel,
    },

    /// Priorities are not exactly `1..=n` in order.
    PriorityGap {
        event_id: String,
        priorities: Vec<u32>,
    },

    /// The same `(event, agent)` pair was allocated twice while its lock
    /// should still have been held.
    DoubleLock {
        event_id: String,
        agent_id: String,
        first_ms: i64,
        second_ms: i64,
    },

    /// Cumulative allocations on one post passed the thread cap.
    ThreadCapExceeded {
        post_id: String,
        allocated: u32,
        cap: u32,
    },

    /// An event deeper than the chain ceiling was admitted.
    DepthExceeded {
        event_id: String,
        chain_depth: u32,
        max_depth: u32,
    },

    /// An idempotency key was admitted twice inside its TTL.
    DuplicateAdmission {
        idempotency_key: String,
        first_ms: i64,
        second_ms: i64,
    },

    /// An agent that was not active got allocated.
    IneligibleAgent {
        event_id: String,
        agent_id: String,
        status: AgentStatus,
    },

    /// An agent acted twice within the cooldown window.
    CooldownViolated {
        agent_id: String,
        previous_ms: i64,
        next_ms: i64,
        cooldown_ms: i64,
    },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks a recorded simulation trace against the allocation invariants.
pub struct AllocationOracle;

impl AllocationOracle {
    /// Run every checker and merge the results.
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        let cfg = &result.allocator;
        Self::check_per_event(&result.trace, cfg)
            .merge(Self::check_locks(&result.trace, cfg))
            .merge(Self::check_thread_caps(&result.trace, cfg))
            .merge(Self::check_admission(&result.trace, cfg))
            .merge(Self::check_eligibility(result))
            .merge(Self::check_cooldowns(&result.trace, cfg))
    }

    /// Self-exclusion, quota bound, quota ceiling and priority density.
    #[must_use]
    pub fn check_per_event(trace: &[TraceEntry], cfg: &AllocatorConfig) -> OracleResult {
        let mut violations = Vec::new();
        for entry in trace {
            let event = &entry.event;
            let result = &entry.result;

            if let Some(agent) = result
                .agents
                .iter()
                .find(|a| a.agent_id == event.author_agent_id)
            {
                violations.push(InvariantViolation::SelfAllocation {
                    event_id: event.event_id.clone(),
                    agent_id: agent.agent_id.clone(),
                });
            }

            let allocated = result.agents.len();
            if !u32::try_from(allocated).is_ok_and(|n| n <= result.quota_applied) {
                violations.push(InvariantViolation::QuotaExceeded {
                    event_id: event.event_id.clone(),
                    allocated,
                    quota: result.quota_applied,
                });
            }

            let ceiling = quota_ceiling(cfg, &event.event_type, result.degradation_level);
            if result.quota_applied > ceiling {
                violations.push(InvariantViolation::QuotaAboveCeiling {
                    event_id: event.event_id.clone(),
                    quota: result.quota_applied,
                    ceiling,
                    level: result.degradation_level,
                });
            }

            let priorities: Vec<u32> = result.agents.iter().map(|a| a.priority).collect();
            if !priorities.iter().copied().eq(1..=u32::try_from(allocated).unwrap_or(u32::MAX)) {
                violations.push(InvariantViolation::PriorityGap {
                    event_id: event.event_id.clone(),
                    priorities,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    /// No `(event, agent)` pair is granted twice within the lock TTL.
    #[must_use]
    pub fn check_locks(trace: &[TraceEntry], cfg: &AllocatorConfig) -> OracleResult {
        let ttl_ms = i64::try_from(cfg.lock_ttl_ms).unwrap_or(i64::MAX);
        let mut granted: HashMap<(&str, &str), i64> = HashMap::new();
        let mut violations = Vec::new();

        for entry in trace {
            for agent in &entry.result.agents {
                let key = (entry.event.event_id.as_str(), agent.agent_id.as_str());
                if let Some(&first_ms) = granted.get(&key) {
                    if entry.processed_at_ms.saturating_sub(first_ms) <= ttl_ms {
                        violations.push(InvariantViolation::DoubleLock {
                            event_id: key.0.to_string(),
                            agent_id: key.1.to_string(),
                            first_ms,
                            second_ms: entry.processed_at_ms,
                        });
                        continue;
                    }
                }
                granted.insert(key, entry.processed_at_ms);
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Cumulative allocations per post stay within the thread cap.
    #[must_use]
    pub fn check_thread_caps(trace: &[TraceEntry], cfg: &AllocatorConfig) -> OracleResult {
        let cap = cfg.default_thread_max_agents;
        let mut per_post: BTreeMap<&str, u32> = BTreeMap::new();
        for entry in trace {
            if let Some(post_id) = entry.event.post_id.as_deref() {
                let n = u32::try_from(entry.result.agents.len()).unwrap_or(u32::MAX);
                let total = per_post.entry(post_id).or_insert(0);
                *total = total.saturating_add(n);
            }
        }

        let violations = per_post
            .into_iter()
            .filter(|&(_, allocated)| allocated > cap)
            .map(|(post_id, allocated)| InvariantViolation::ThreadCapExceeded {
                post_id: post_id.to_string(),
                allocated,
                cap,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Depth ceiling and idempotency over admitted events.
    #[must_use]
    pub fn check_admission(trace: &[TraceEntry], cfg: &AllocatorConfig) -> OracleResult {
        let ttl_ms = i64::try_from(cfg.idempotency_ttl_ms).unwrap_or(i64::MAX);
        let mut admitted: HashMap<&str, i64> = HashMap::new();
        let mut violations = Vec::new();

        for entry in trace.iter().filter(|e| e.result.admission_reason().is_none()) {
            let event = &entry.event;
            if event.chain_depth > cfg.max_chain_depth {
                violations.push(InvariantViolation::DepthExceeded {
                    event_id: event.event_id.clone(),
                    chain_depth: event.chain_depth,
                    max_depth: cfg.max_chain_depth,
                });
            }

            let key = event.idempotency_key.as_str();
            if let Some(&first_ms) = admitted.get(key) {
                if entry.processed_at_ms.saturating_sub(first_ms) <= ttl_ms {
                    violations.push(InvariantViolation::DuplicateAdmission {
                        idempotency_key: key.to_string(),
                        first_ms,
                        second_ms: entry.processed_at_ms,
                    });
                    continue;
                }
            }
            admitted.insert(key, entry.processed_at_ms);
        }
        OracleResult::from_violations(violations)
    }

    /// Only active agents are ever allocated.
    #[must_use]
    pub fn check_eligibility(result: &SimulationResult) -> OracleResult {
        let statuses: HashMap<&str, AgentStatus> = result
            .roster
            .iter()
            .map(|p| (p.agent_id.as_str(), p.status))
            .collect();

        let violations = result
            .trace
            .iter()
            .flat_map(|entry| {
                entry.result.agents.iter().filter_map(|agent| {
                    let status = statuses.get(agent.agent_id.as_str()).copied()?;
                    (status != AgentStatus::Active).then(|| InvariantViolation::IneligibleAgent {
                        event_id: entry.event.event_id.clone(),
                        agent_id: agent.agent_id.clone(),
                        status,
                    })
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Consecutive successful actions of one agent are a full cooldown apart.
    #[must_use]
    pub fn check_cooldowns(trace: &[TraceEntry], cfg: &AllocatorConfig) -> OracleResult {
        let cooldown_ms = i64::try_from(cfg.cooldown_seconds.saturating_mul(1_000))
            .unwrap_or(i64::MAX);
        let mut last_action: HashMap<&str, i64> = HashMap::new();
        let mut violations = Vec::new();

        for entry in trace {
            for agent_id in &entry.executed {
                let now = entry.processed_at_ms;
                if let Some(previous_ms) = last_action.insert(agent_id.as_str(), now) {
                    if now.saturating_sub(previous_ms) < cooldown_ms {
                        violations.push(InvariantViolation::CooldownViolated {
                            agent_id: agent_id.clone(),
                            previous_ms,
                            next_ms: now,
                            cooldown_ms,
                        });
                    }
                }
            }
        }
        OracleResult::from_violations(violations)
    }
}

/// Largest quota the calculator may return for `event_type` at `level`,
/// ignoring thread consumption.
fn quota_ceiling(
    cfg: &AllocatorConfig,
    event_type: &agora_core::EventType,
    level: DegradationLevel,
) -> u32 {
    let raw = cfg
        .event_base_quota
        .for_event(event_type)
        .min(cfg.global_max_agents_per_event)
        .min(cfg.default_community_max_agents);
    let factor = match level {
        DegradationLevel::Normal => 1.0,
        DegradationLevel::Moderate => cfg.degradation.moderate_factor,
        DegradationLevel::Critical => cfg.degradation.critical_factor,
    };
    let scaled = (f64::from(raw) * factor).floor();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(raw) {
        raw
    } else {
        // In range (0, raw), so the cast is exact.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ceiling = scaled as u32;
        ceiling
    }
}
