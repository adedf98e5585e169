use std::sync::Arc;

use agora_core::runtime::ExecutorError;
use agora_core::{AllocationResult, Clock, EventPayload, ExecutionOutcome, Executor};

use crate::forum::{SharedForum, lock_forum};
use crate::rng::DeterministicRng;

const MIN_TOKENS: u64 = 200;
const TOKEN_SPREAD: u64 = 1_800;

/// Stand-in for the LLM-backed executor: each allocated agent "writes" a
/// reply, spending tokens, unless a seeded failure is injected.
pub struct SimExecutor {
    forum: SharedForum,
    clock: Arc<dyn Clock>,
    rng: DeterministicRng,
    failure_percent: u8,
}

impl SimExecutor {
    #[must_use]
    pub fn new(
        forum: SharedForum,
        clock: Arc<dyn Clock>,
        rng: DeterministicRng,
        failure_percent: u8,
    ) -> Self {
        Self {
            forum,
            clock,
            rng,
            failure_percent,
        }
    }
}

impl Executor for SimExecutor {
    fn execute(
        &mut self,
        event: &EventPayload,
        allocation: &AllocationResult,
    ) -> Result<Vec<ExecutionOutcome>, ExecutorError> {
        let now_ms = self.clock.now_millis();
        let mut forum = lock_forum(&self.forum);
        let outcomes = allocation
            .agent_ids()
            .map(|agent_id| {
                if self.rng.hit_rate_percent(self.failure_percent) {
                    return ExecutionOutcome::failed(agent_id, &event.event_id, "injected failure");
                }
                let tokens = MIN_TOKENS + self.rng.next_bounded(TOKEN_SPREAD);
                forum.record_action(agent_id, now_ms, tokens, event.post_id.as_deref());
                ExecutionOutcome::succeeded(agent_id, &event.event_id)
            })
            .collect();
        Ok(outcomes)
    }
}
