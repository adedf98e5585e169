//! Five-stage allocation pipeline.
//!
//! ```text
//! event ─► admission ─► quota ─► candidates ─► lock ─► AllocationResult
//!             │           │
//!             └─ _admission└─ _quota          agent_id ─► lock_conflict
//! ```

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::admission::{AdmissionGate, AdmissionVerdict};
use crate::clock::Clock;
use crate::config::AllocatorConfig;
use crate::degradation::DegradationMonitor;
use crate::error::AllocError;
use crate::event::{
    ADMISSION_REASON_KEY, AllocationResult, EventPayload, LOCK_CONFLICT_REASON, QUOTA_REASON_KEY,
    SelectedAgent,
};
use crate::lock::AllocationLock;
use crate::quota::{QuotaCalculator, QuotaContext};
use crate::random::RandomSource;
use crate::repo::AgentRepository;
use crate::select::CandidateSelector;
use crate::store::InMemoryStore;

/// Reason recorded under `_quota` when no agent may respond.
pub const ZERO_QUOTA_REASON: &str = "effective quota is 0";

/// Stage instances wired into an [`EventAllocator`].
pub struct AllocatorDeps {
    pub admission: AdmissionGate,
    pub quota: QuotaCalculator,
    pub selector: CandidateSelector,
    pub lock: AllocationLock,
    pub degradation: DegradationMonitor,
    pub repository: Arc<dyn AgentRepository>,
}

/// Owns every stage of one shard. Mutation goes through `&mut self`, so
/// allocations on a shard never interleave.
pub struct EventAllocator {
    admission: AdmissionGate,
    quota: QuotaCalculator,
    selector: CandidateSelector,
    lock: AllocationLock,
    degradation: DegradationMonitor,
    repository: Arc<dyn AgentRepository>,
}

impl EventAllocator {
    #[must_use]
    pub fn new(deps: AllocatorDeps) -> Self {
        let AllocatorDeps {
            admission,
            quota,
            selector,
            lock,
            degradation,
            repository,
        } = deps;
        Self {
            admission,
            quota,
            selector,
            lock,
            degradation,
            repository,
        }
    }

    /// Allocator backed by fresh in-memory idempotency and lock stores.
    #[must_use]
    pub fn in_memory(
        cfg: &AllocatorConfig,
        repository: Arc<dyn AgentRepository>,
        clock: Arc<dyn Clock>,
        random: Box<dyn RandomSource>,
    ) -> Self {
        Self::new(AllocatorDeps {
            admission: AdmissionGate::new(cfg, InMemoryStore::shared(), Arc::clone(&clock)),
            quota: QuotaCalculator::new(cfg),
            selector: CandidateSelector::new(cfg, Arc::clone(&clock), random),
            lock: AllocationLock::new(cfg, InMemoryStore::shared(), clock),
            degradation: DegradationMonitor::new(cfg.degradation),
            repository,
        })
    }

    /// Decide which agents respond to `event`.
    ///
    /// Admission rejections, a zero quota and lock conflicts are reported in
    /// [`AllocationResult::skipped_reasons`].
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] when the repository or a store backend fails.
    /// Nothing is retried; an admitted event stays marked as seen.
    #[instrument(
        skip_all,
        fields(event_id = %event.event_id, event_type = %event.event_type)
    )]
    pub fn allocate(&mut self, event: &EventPayload) -> Result<AllocationResult, AllocError> {
        let degradation = self.degradation.state();

        // Stage 1
        if let AdmissionVerdict::Rejected { reason } = self.admission.check(event)? {
            return Ok(AllocationResult::skipped(
                &event.event_id,
                degradation.level,
                ADMISSION_REASON_KEY,
                reason,
            ));
        }
        self.admission.mark_seen(&event.idempotency_key)?;

        // Stage 2
        let quota = self
            .quota
            .calculate(&QuotaContext::from_event(event), &degradation);
        if quota == 0 {
            debug!(level = %degradation.level, "effective quota is zero");
            return Ok(AllocationResult::skipped(
                &event.event_id,
                degradation.level,
                QUOTA_REASON_KEY,
                ZERO_QUOTA_REASON,
            ));
        }

        // Stage 3
        let pool = self
            .repository
            .candidates(&event.community_id)
            .map_err(|err| AllocError::Repository {
                community_id: event.community_id.clone(),
                reason: err.to_string(),
            })?;
        let ranked = self.selector.select(event, &pool, quota, &degradation);

        // Stage 4
        let mut result = AllocationResult {
            event_id: event.event_id.clone(),
            quota_applied: quota,
            degradation_level: degradation.level,
            agents: Vec::with_capacity(ranked.len()),
            skipped_reasons: std::collections::BTreeMap::new(),
        };
        let mut priority = 0_u32;
        for candidate in ranked {
            if self.lock.try_acquire(&event.event_id, &candidate.agent_id)? {
                priority += 1;
                result.agents.push(SelectedAgent {
                    agent_id: candidate.agent_id,
                    score: candidate.score,
                    priority,
                });
            } else {
                warn!(agent_id = %candidate.agent_id, "allocation lock already held");
                result
                    .skipped_reasons
                    .insert(candidate.agent_id, LOCK_CONFLICT_REASON.to_string());
            }
        }

        // Stage 5
        debug!(
            quota,
            pool = pool.len(),
            allocated = result.agents.len(),
            "allocation complete"
        );
        Ok(result)
    }

    #[must_use]
    pub const fn degradation(&self) -> &DegradationMonitor {
        &self.degradation
    }

    pub const fn degradation_mut(&mut self) -> &mut DegradationMonitor {
        &mut self.degradation
    }

    #[must_use]
    pub const fn quota(&self) -> &QuotaCalculator {
        &self.quota
    }

    pub const fn quota_mut(&mut self) -> &mut QuotaCalculator {
        &mut self.quota
    }

    #[must_use]
    pub const fn lock(&self) -> &AllocationLock {
        &self.lock
    }

    #[must_use]
    pub const fn admission(&self) -> &AdmissionGate {
        &self.admission
    }
}
