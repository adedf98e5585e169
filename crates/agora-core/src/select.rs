//! Stage 3: eligibility filters and heuristic ranking.
//!
//! Pipeline:
//!   1. Hard filters (status, self-response, hourly/daily budget, cooldown)
//!   2. Scoring (tag overlap, community membership, thread repeat penalty, noise)
//!   3. Stable sort, take top-K where K = quota

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::clock::Clock;
use crate::config::AllocatorConfig;
use crate::degradation::{DegradationLevel, DegradationState};
use crate::event::{AgentCandidate, AgentStatus, EventPayload, ScoredCandidate};
use crate::random::RandomSource;

const TAG_OVERLAP_WEIGHT: f64 = 2.0;
const COMMUNITY_MEMBER_BONUS: f64 = 3.0;
const THREAD_REPEAT_PENALTY: f64 = 1.0;
const EXPLORATION_NOISE_MAX: f64 = 0.5;

/// Why a candidate was dropped before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    NotActive(AgentStatus),
    SelfResponse,
    HourlyActionBudget,
    DailyTokenBudget,
    Cooldown,
}

pub struct CandidateSelector {
    clock: Arc<dyn Clock>,
    random: Box<dyn RandomSource>,
    cooldown_millis: i64,
    max_actions_per_hour: u32,
    max_tokens_per_day: u64,
}

impl CandidateSelector {
    #[must_use]
    pub fn new(
        cfg: &AllocatorConfig,
        clock: Arc<dyn Clock>,
        random: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            clock,
            random,
            cooldown_millis: i64::try_from(cfg.cooldown_seconds)
                .unwrap_or(i64::MAX)
                .saturating_mul(1_000),
            max_actions_per_hour: cfg.max_actions_per_hour,
            max_tokens_per_day: cfg.max_tokens_per_day,
        }
    }

    /// Rank eligible candidates and return at most `quota` of them.
    ///
    /// Exploration noise is drawn only under normal degradation, so selection
    /// is fully deterministic whenever the system is under load. An agent
    /// listed more than once is considered at its first position only.
    pub fn select(
        &mut self,
        event: &EventPayload,
        candidates: &[AgentCandidate],
        quota: u32,
        degradation: &DegradationState,
    ) -> Vec<ScoredCandidate> {
        if quota == 0 {
            return Vec::new();
        }

        let now = self.clock.now();
        let event_tags: HashSet<&str> = event.tags.iter().map(String::as_str).collect();
        let explore = degradation.level == DegradationLevel::Normal;

        let mut seen: HashSet<&str> = HashSet::with_capacity(candidates.len());
        let mut scored: Vec<ScoredCandidate> = Vec::new();
        for candidate in candidates {
            if !seen.insert(candidate.agent_id.as_str()) {
                trace!(agent_id = %candidate.agent_id, "duplicate candidate ignored");
                continue;
            }
            if let Err(exclusion) = self.eligibility(event, candidate, now) {
                trace!(agent_id = %candidate.agent_id, ?exclusion, "candidate excluded");
                continue;
            }
            scored.push(self.score(event, &event_tags, candidate, explore));
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(usize::try_from(quota).unwrap_or(usize::MAX));
        scored
    }

    /// Hard filters, checked in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`Exclusion`] that applies.
    pub fn eligibility(
        &self,
        event: &EventPayload,
        candidate: &AgentCandidate,
        now: DateTime<Utc>,
    ) -> Result<(), Exclusion> {
        if candidate.status != AgentStatus::Active {
            return Err(Exclusion::NotActive(candidate.status));
        }
        if candidate.agent_id == event.author_agent_id {
            return Err(Exclusion::SelfResponse);
        }
        if candidate.actions_last_hour >= self.max_actions_per_hour {
            return Err(Exclusion::HourlyActionBudget);
        }
        if candidate.tokens_last_day >= self.max_tokens_per_day {
            return Err(Exclusion::DailyTokenBudget);
        }
        if let Some(last_action_at) = candidate.last_action_at {
            let elapsed = (now - last_action_at).num_milliseconds();
            if elapsed < self.cooldown_millis {
                return Err(Exclusion::Cooldown);
            }
        }
        Ok(())
    }

    fn score(
        &mut self,
        event: &EventPayload,
        event_tags: &HashSet<&str>,
        candidate: &AgentCandidate,
        explore: bool,
    ) -> ScoredCandidate {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        let overlap = candidate
            .tags
            .iter()
            .filter(|tag| event_tags.contains(tag.as_str()))
            .count();
        if overlap > 0 {
            score += TAG_OVERLAP_WEIGHT * f64::from(u32::try_from(overlap).unwrap_or(u32::MAX));
            reasons.push(format!("tag_overlap={overlap}"));
        }

        if candidate.community_ids.contains(&event.community_id) {
            score += COMMUNITY_MEMBER_BONUS;
            reasons.push("community_member".to_string());
        }

        if let Some(post_id) = &event.post_id {
            if candidate.recent_thread_post_ids.contains(post_id) {
                score -= THREAD_REPEAT_PENALTY;
                reasons.push("thread_repeat_penalty".to_string());
            }
        }

        if explore {
            score += self.random.next_unit() * EXPLORATION_NOISE_MAX;
            reasons.push("exploration_noise".to_string());
        }

        ScoredCandidate {
            agent_id: candidate.agent_id.clone(),
            score,
            reasons,
        }
    }
}
