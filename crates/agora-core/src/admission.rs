//! Stage 1: shape validation, chain-depth ceiling and idempotency dedup.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::config::AllocatorConfig;
use crate::error::StoreError;
use crate::event::EventPayload;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionVerdict {
    Admitted,
    Rejected { reason: String },
}

impl AdmissionVerdict {
    fn reject(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Admitted => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

/// Admission gate with a TTL-bounded seen-set keyed on `idempotency_key`.
pub struct AdmissionGate {
    seen: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_chain_depth: u32,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(cfg: &AllocatorConfig, seen: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            seen,
            clock,
            ttl: cfg.idempotency_ttl(),
            max_chain_depth: cfg.max_chain_depth,
        }
    }

    /// Validate an event. The first failing rule determines the reason.
    ///
    /// Has no side effects beyond sweeping expired seen-entries; callers must
    /// invoke [`Self::mark_seen`] once the event is admitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the seen-set backend fails.
    pub fn check(&self, event: &EventPayload) -> Result<AdmissionVerdict, StoreError> {
        let verdict = self.check_inner(event)?;
        if let AdmissionVerdict::Rejected { reason } = &verdict {
            debug!(event_id = %event.event_id, %reason, "admission rejected");
        }
        Ok(verdict)
    }

    fn check_inner(&self, event: &EventPayload) -> Result<AdmissionVerdict, StoreError> {
        if event.event_id.is_empty() {
            return Ok(AdmissionVerdict::reject("missing or invalid event_id"));
        }
        if !event.event_type.is_known() {
            return Ok(AdmissionVerdict::reject(format!(
                "unknown event_type: {}",
                event.event_type
            )));
        }
        if event.idempotency_key.is_empty() {
            return Ok(AdmissionVerdict::reject("missing idempotency_key"));
        }
        if event.community_id.is_empty() {
            return Ok(AdmissionVerdict::reject("missing community_id"));
        }
        if event.author_agent_id.is_empty() {
            return Ok(AdmissionVerdict::reject("missing author_agent_id"));
        }
        if event.chain_depth > self.max_chain_depth {
            return Ok(AdmissionVerdict::reject(format!(
                "chain_depth {} exceeds max {}",
                event.chain_depth, self.max_chain_depth
            )));
        }

        let now = self.clock.now();
        self.seen.sweep(now)?;

        if self.seen.get_if_present(&event.idempotency_key, now)?.is_some() {
            return Ok(AdmissionVerdict::reject("duplicate idempotency_key"));
        }

        Ok(AdmissionVerdict::Admitted)
    }

    /// Record an admitted key so redeliveries are rejected until the TTL lapses.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the seen-set backend fails.
    pub fn mark_seen(&self, idempotency_key: &str) -> Result<(), StoreError> {
        self.seen.put(idempotency_key, self.clock.now(), self.ttl)
    }

    #[must_use]
    pub const fn max_chain_depth(&self) -> u32 {
        self.max_chain_depth
    }
}
