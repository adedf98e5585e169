#![forbid(unsafe_code)]
//! agora-core library.
//!
//! Allocates bounded sets of agent responders to forum events through a
//! five-stage pipeline: admission, quota, candidate selection, locking and
//! output. The queue consumer closes the loop by feeding observed lag back
//! into the degradation monitor and thread consumption back into the quota
//! calculator.
//!
//! # Conventions
//!
//! - **Errors**: Business-rule outcomes are values (`skipped_reasons`);
//!   collaborator faults are `thiserror` enums carrying an [`error::ErrorCode`].
//!   Config loading uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod admission;
pub mod allocator;
pub mod bridge;
pub mod chain;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod degradation;
pub mod error;
pub mod event;
pub mod lock;
pub mod queue;
pub mod quota;
pub mod random;
pub mod repo;
pub mod runtime;
pub mod select;
pub mod store;
pub mod worker;

pub use admission::{AdmissionGate, AdmissionVerdict};
pub use allocator::{AllocatorDeps, EventAllocator};
pub use bridge::{DomainEvent, EventBridge};
pub use chain::{FollowUpOptions, derive_follow_up_events};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AllocatorConfig;
pub use consumer::{BatchResult, ConsumerStats, ProcessedEvent, QueueConsumer};
pub use degradation::{DegradationLevel, DegradationMonitor, DegradationState};
pub use error::{AllocError, ErrorCode, StoreError};
pub use event::{
    AgentCandidate, AgentStatus, AllocationResult, EventPayload, EventType, ScoredCandidate,
    SelectedAgent,
};
pub use lock::AllocationLock;
pub use queue::{EventQueue, InMemoryEventQueue};
pub use quota::{QuotaCalculator, QuotaContext, QuotaLimits};
pub use random::RandomSource;
pub use repo::{AgentRepository, InMemoryAgentRepository, RepositoryError};
pub use runtime::{Executor, ExecutionOutcome, RuntimeConfig, RuntimeLoop, TickReport};
pub use select::CandidateSelector;
pub use store::{InMemoryStore, KeyValueStore};
pub use worker::ShardWorker;
