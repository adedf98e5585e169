//! Stage 4: per-(event, agent) exclusivity with TTL.
//!
//! Locks are never released by the allocator on success. The TTL bounds
//! how long a crashed executor can block redelivery of the same pair.

use std::sync::Arc;

use chrono::Duration;
use tracing::trace;

use crate::clock::Clock;
use crate::config::AllocatorConfig;
use crate::error::StoreError;
use crate::store::KeyValueStore;

pub struct AllocationLock {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl AllocationLock {
    #[must_use]
    pub fn new(cfg: &AllocatorConfig, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: cfg.lock_ttl(),
        }
    }

    fn key(event_id: &str, agent_id: &str) -> String {
        format!("{event_id}:{agent_id}")
    }

    /// Claim the `(event_id, agent_id)` pair. Returns `false` if another
    /// allocation holds a live lock on it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lock backend fails.
    pub fn try_acquire(&self, event_id: &str, agent_id: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        self.store.sweep(now)?;
        let acquired = self
            .store
            .put_if_absent(&Self::key(event_id, agent_id), now, self.ttl)?;
        trace!(event_id, agent_id, acquired, "lock attempt");
        Ok(acquired)
    }

    /// Drop a held lock ahead of its TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lock backend fails.
    pub fn release(&self, event_id: &str, agent_id: &str) -> Result<(), StoreError> {
        self.store.expire(&Self::key(event_id, agent_id))
    }

    /// Number of held locks, including expired ones not yet swept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lock backend fails.
    pub fn len(&self) -> Result<usize, StoreError> {
        self.store.len()
    }

    /// # Errors
    ///
    /// Returns [`StoreError`] if the lock backend fails.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// # Errors
    ///
    /// Returns [`StoreError`] if the lock backend fails.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.clear()
    }
}
