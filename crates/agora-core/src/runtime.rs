//! Tick-driven runtime: consume, execute, propagate.
//!
//! ```text
//! queue ─► allocate ─► Executor::execute ─► follow-ups ─► queue
//! ```
//!
//! The executor is the seam to whatever produces agent output (an LLM
//! client, a script, a test double). Executor failures are logged and
//! counted; they never abort a tick.

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::chain::{FollowUpOptions, derive_follow_up_events};
use crate::consumer::{ProcessedEvent, QueueConsumer};
use crate::error::{AllocError, ErrorCode};
use crate::event::{AllocationResult, EventPayload};
use crate::queue::{EventQueue, InMemoryEventQueue};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor failed for event {event_id}: {reason}")]
    Failed { event_id: String, reason: String },
}

impl ExecutorError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ExecutorFailed
    }
}

/// Outcome of one allocated agent acting on an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub agent_id: String,
    pub event_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn succeeded(agent_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            event_id: event_id.into(),
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(
        agent_id: impl Into<String>,
        event_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            event_id: event_id.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Runs allocated agents against an event.
pub trait Executor: Send {
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the whole allocation could not be run.
    /// Per-agent failures belong in the returned outcomes.
    fn execute(
        &mut self,
        event: &EventPayload,
        allocation: &AllocationResult,
    ) -> Result<Vec<ExecutionOutcome>, ExecutorError>;
}

/// Reports every allocated agent as successful without doing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl Executor for NoopExecutor {
    fn execute(
        &mut self,
        event: &EventPayload,
        allocation: &AllocationResult,
    ) -> Result<Vec<ExecutionOutcome>, ExecutorError> {
        Ok(allocation
            .agent_ids()
            .map(|agent_id| ExecutionOutcome::succeeded(agent_id, &event.event_id))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub batch_size: usize,
    /// Enqueue a follow-up for every agent that executed successfully.
    pub propagate_follow_ups: bool,
    pub follow_up: FollowUpOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            propagate_follow_ups: false,
            follow_up: FollowUpOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub processed_events: usize,
    pub allocated_agents: usize,
    pub successful: usize,
    pub failed: usize,
    pub follow_ups_enqueued: usize,
    pub executions: Vec<ExecutionOutcome>,
    /// Every processed event with its allocation, including empty ones.
    #[serde(skip)]
    pub allocations: Vec<ProcessedEvent>,
}

pub struct RuntimeLoop<E: Executor, Q: EventQueue = InMemoryEventQueue> {
    consumer: QueueConsumer<Q>,
    executor: E,
    config: RuntimeConfig,
}

impl<E: Executor, Q: EventQueue> RuntimeLoop<E, Q> {
    #[must_use]
    pub const fn new(consumer: QueueConsumer<Q>, executor: E, config: RuntimeConfig) -> Self {
        Self {
            consumer,
            executor,
            config,
        }
    }

    /// Process up to `batch_size` events and run the executor for every
    /// non-empty allocation.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] on queue, store or repository faults.
    #[instrument(skip(self), fields(batch_size = self.config.batch_size))]
    pub fn tick(&mut self) -> Result<TickReport, AllocError> {
        let mut report = TickReport::default();

        for _ in 0..self.config.batch_size {
            let Some(ProcessedEvent { event, result }) = self.consumer.process_one()? else {
                break;
            };
            report.processed_events += 1;
            if result.agents.is_empty() {
                report.allocations.push(ProcessedEvent { event, result });
                continue;
            }
            report.allocated_agents += result.agents.len();

            let outcomes = match self.executor.execute(&event, &result) {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    error!(code = %err.code(), %err, "executor failed");
                    result
                        .agent_ids()
                        .map(|agent_id| {
                            ExecutionOutcome::failed(agent_id, &event.event_id, err.to_string())
                        })
                        .collect()
                }
            };

            if self.config.propagate_follow_ups {
                report.follow_ups_enqueued += self.enqueue_follow_ups(&event, &result, &outcomes)?;
            }
            report.executions.extend(outcomes);
            report.allocations.push(ProcessedEvent { event, result });
        }
        self.consumer.report_lag();

        report.successful = report.executions.iter().filter(|o| o.success).count();
        report.failed = report.executions.len() - report.successful;

        if report.processed_events > 0 {
            info!(
                processed = report.processed_events,
                allocated = report.allocated_agents,
                successful = report.successful,
                failed = report.failed,
                follow_ups = report.follow_ups_enqueued,
                "tick complete"
            );
        }
        Ok(report)
    }

    fn enqueue_follow_ups(
        &mut self,
        event: &EventPayload,
        allocation: &AllocationResult,
        outcomes: &[ExecutionOutcome],
    ) -> Result<usize, AllocError> {
        let mut succeeded = allocation.clone();
        succeeded.agents.retain(|agent| {
            outcomes
                .iter()
                .any(|o| o.success && o.agent_id == agent.agent_id)
        });

        let created_at = self.consumer.clock().now();
        let follow_ups =
            derive_follow_up_events(event, &succeeded, &self.config.follow_up, created_at);
        let count = follow_ups.len();
        for follow_up in follow_ups {
            self.consumer.enqueue(follow_up)?;
        }
        Ok(count)
    }

    #[must_use]
    pub const fn consumer(&self) -> &QueueConsumer<Q> {
        &self.consumer
    }

    pub const fn consumer_mut(&mut self) -> &mut QueueConsumer<Q> {
        &mut self.consumer
    }

    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    #[must_use]
    pub fn into_parts(self) -> (QueueConsumer<Q>, E) {
        (self.consumer, self.executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::EventAllocator;
    use crate::clock::{Clock, ManualClock};
    use crate::config::AllocatorConfig;
    use crate::event::{AgentCandidate, EventType};
    use crate::random::FixedRandom;
    use crate::repo::InMemoryAgentRepository;
    use std::sync::Arc;

    /// Fails the agent named `flaky`, or the whole call when `down` is set.
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: usize,
        down: bool,
    }

    impl Executor for ScriptedExecutor {
        fn execute(
            &mut self,
            event: &EventPayload,
            allocation: &AllocationResult,
        ) -> Result<Vec<ExecutionOutcome>, ExecutorError> {
            self.calls += 1;
            if self.down {
                return Err(ExecutorError::Failed {
                    event_id: event.event_id.clone(),
                    reason: "llm timeout".into(),
                });
            }
            Ok(allocation
                .agent_ids()
                .map(|id| {
                    if id == "flaky" {
                        ExecutionOutcome::failed(id, &event.event_id, "parse error")
                    } else {
                        ExecutionOutcome::succeeded(id, &event.event_id)
                    }
                })
                .collect())
        }
    }

    fn runtime(
        executor: ScriptedExecutor,
        config: RuntimeConfig,
    ) -> (RuntimeLoop<ScriptedExecutor>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let pool = vec![
            AgentCandidate::active("steady"),
            AgentCandidate::active("flaky"),
        ];
        let allocator = EventAllocator::in_memory(
            &AllocatorConfig::default(),
            Arc::new(InMemoryAgentRepository::with_pool(pool)),
            clock.clone(),
            Box::new(FixedRandom(0.0)),
        );
        let consumer = QueueConsumer::new(InMemoryEventQueue::new(), allocator, clock.clone());
        (RuntimeLoop::new(consumer, executor, config), clock)
    }

    fn post(clock: &ManualClock) -> EventPayload {
        EventPayload::new("e1", EventType::NewPostCreated, "c1", "author", clock.now())
            .with_post("p1")
    }

    #[test]
    fn tick_executes_and_counts_outcomes() -> Result<(), AllocError> {
        let (mut rt, clock) = runtime(ScriptedExecutor::default(), RuntimeConfig::default());
        rt.consumer_mut().enqueue(post(&clock))?;

        let report = rt.tick()?;
        assert_eq!(report.processed_events, 1);
        assert_eq!(report.allocated_agents, 2);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.follow_ups_enqueued, 0);
        assert_eq!(rt.executor().calls, 1);
        Ok(())
    }

    #[test]
    fn follow_ups_only_for_successful_agents() -> Result<(), AllocError> {
        let config = RuntimeConfig {
            propagate_follow_ups: true,
            ..RuntimeConfig::default()
        };
        let (mut rt, clock) = runtime(ScriptedExecutor::default(), config);
        rt.consumer_mut().enqueue(post(&clock))?;

        let report = rt.tick()?;
        assert_eq!(report.follow_ups_enqueued, 1);
        let queued = rt.consumer().queue().peek()?.expect("follow-up queued");
        assert_eq!(queued.author_agent_id, "steady");
        assert_eq!(queued.chain_depth, 1);
        assert_eq!(queued.event_type, EventType::NewCommentCreated);
        Ok(())
    }

    #[test]
    fn executor_failure_marks_every_agent_failed() -> Result<(), AllocError> {
        let executor = ScriptedExecutor {
            down: true,
            ..ScriptedExecutor::default()
        };
        let config = RuntimeConfig {
            propagate_follow_ups: true,
            ..RuntimeConfig::default()
        };
        let (mut rt, clock) = runtime(executor, config);
        rt.consumer_mut().enqueue(post(&clock))?;

        let report = rt.tick()?;
        assert_eq!(report.failed, 2);
        assert_eq!(report.successful, 0);
        assert_eq!(report.follow_ups_enqueued, 0);
        assert!(rt.consumer().queue().is_empty());
        Ok(())
    }

    #[test]
    fn empty_allocations_skip_the_executor() -> Result<(), AllocError> {
        let (mut rt, clock) = runtime(ScriptedExecutor::default(), RuntimeConfig::default());
        let mut vote = post(&clock);
        vote.event_type = EventType::VoteCast;
        rt.consumer_mut().enqueue(vote)?;

        let report = rt.tick()?;
        assert_eq!(report.processed_events, 1);
        assert_eq!(report.allocations.len(), 1);
        assert_eq!(rt.executor().calls, 0);
        Ok(())
    }

    #[test]
    fn noop_executor_succeeds_for_all() -> Result<(), ExecutorError> {
        let clock = ManualClock::at_millis(0);
        let event = post(&clock);
        let allocation = AllocationResult {
            event_id: "e1".into(),
            quota_applied: 1,
            degradation_level: crate::degradation::DegradationLevel::Normal,
            agents: vec![crate::event::SelectedAgent {
                agent_id: "a".into(),
                score: 0.0,
                priority: 1,
            }],
            skipped_reasons: std::collections::BTreeMap::new(),
        };
        let outcomes = NoopExecutor.execute(&event, &allocation)?;
        assert_eq!(outcomes, vec![ExecutionOutcome::succeeded("a", "e1")]);
        Ok(())
    }
}
