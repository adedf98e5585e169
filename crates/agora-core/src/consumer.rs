//! Queue consumer: the feedback loop around [`EventAllocator`].
//!
//! Before every dequeue attempt the consumer reports the head's age to the
//! degradation monitor, and after every non-empty allocation on a post it
//! charges the post's thread quota.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::allocator::EventAllocator;
use crate::clock::Clock;
use crate::error::AllocError;
use crate::event::{AllocationResult, EventPayload};
use crate::queue::{EventQueue, InMemoryEventQueue};

/// Batch size used by [`QueueConsumer::drain`] when the queue reports empty.
pub const DRAIN_SENTINEL: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedEvent {
    pub event: EventPayload,
    pub result: AllocationResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub processed: usize,
    pub allocated_agents: usize,
    pub rejected_admission: usize,
    pub rejected_quota: usize,
}

impl ConsumerStats {
    fn record(&mut self, result: &AllocationResult) {
        self.processed += 1;
        self.allocated_agents += result.agents.len();
        if result.admission_reason().is_some() {
            self.rejected_admission += 1;
        }
        if result.quota_reason().is_some() {
            self.rejected_quota += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub entries: Vec<ProcessedEvent>,
    pub stats: ConsumerStats,
}

impl BatchResult {
    /// Allocation results in processing order.
    pub fn results(&self) -> impl Iterator<Item = &AllocationResult> {
        self.entries.iter().map(|entry| &entry.result)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct QueueConsumer<Q: EventQueue = InMemoryEventQueue> {
    queue: Q,
    allocator: EventAllocator,
    clock: Arc<dyn Clock>,
}

impl<Q: EventQueue> QueueConsumer<Q> {
    #[must_use]
    pub fn new(queue: Q, allocator: EventAllocator, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            allocator,
            clock,
        }
    }

    /// # Errors
    ///
    /// Returns [`AllocError::Queue`] when the queue rejects the write.
    pub fn enqueue(&mut self, event: EventPayload) -> Result<(), AllocError> {
        self.queue.enqueue(event)
    }

    /// Allocate the head of the queue, if any. Lag is reported before the
    /// dequeue and again once the next event is at the head.
    ///
    /// # Errors
    ///
    /// Propagates queue and allocator faults. The dequeued event is not
    /// requeued.
    pub fn process_one(&mut self) -> Result<Option<ProcessedEvent>, AllocError> {
        self.report_lag();
        let Some(event) = self.queue.dequeue()? else {
            return Ok(None);
        };

        let result = self.allocator.allocate(&event)?;
        if let Some(post_id) = event.post_id.as_deref() {
            if !result.agents.is_empty() {
                let count = u32::try_from(result.agents.len()).unwrap_or(u32::MAX);
                self.allocator
                    .quota_mut()
                    .record_thread_allocation(post_id, count);
            }
        }
        self.report_lag();
        Ok(Some(ProcessedEvent { event, result }))
    }

    /// Process up to `max_events`, stopping early when the queue empties.
    ///
    /// # Errors
    ///
    /// The first fault aborts the batch; results gathered so far are dropped.
    #[instrument(skip(self), fields(queued = self.queue.len()))]
    pub fn process_batch(&mut self, max_events: usize) -> Result<BatchResult, AllocError> {
        let mut batch = BatchResult::default();
        for _ in 0..max_events {
            let Some(entry) = self.process_one()? else {
                break;
            };
            batch.stats.record(&entry.result);
            batch.entries.push(entry);
        }
        self.report_lag();

        if !batch.is_empty() {
            info!(
                processed = batch.stats.processed,
                allocated_agents = batch.stats.allocated_agents,
                rejected_admission = batch.stats.rejected_admission,
                rejected_quota = batch.stats.rejected_quota,
                level = %self.allocator.degradation().state().level,
                "batch processed"
            );
        }
        Ok(batch)
    }

    /// Process everything currently queued.
    ///
    /// # Errors
    ///
    /// Same as [`Self::process_batch`].
    pub fn drain(&mut self) -> Result<BatchResult, AllocError> {
        let pending = self.queue.len();
        self.process_batch(if pending == 0 { DRAIN_SENTINEL } else { pending })
    }

    /// Head age in seconds, clamped at zero; zero for an empty queue.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_lag_seconds(&self) -> f64 {
        self.queue.oldest_timestamp_ms().map_or(0.0, |oldest| {
            let lag_ms = self.clock.now_millis().saturating_sub(oldest).max(0);
            lag_ms as f64 / 1_000.0
        })
    }

    /// Feed the current head age into the degradation monitor.
    pub fn report_lag(&mut self) {
        let lag = self.current_lag_seconds();
        self.allocator.degradation_mut().report_lag(lag);
    }

    #[must_use]
    pub const fn queue(&self) -> &Q {
        &self.queue
    }

    pub const fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    #[must_use]
    pub const fn allocator(&self) -> &EventAllocator {
        &self.allocator
    }

    pub const fn allocator_mut(&mut self) -> &mut EventAllocator {
        &mut self.allocator
    }

    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}
