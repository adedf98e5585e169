use std::fmt;

/// Machine-readable error codes for operators and alerting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ConfigInvalid,
    RepositoryUnavailable,
    StoreUnavailable,
    QueueUnavailable,
    WorkerDisconnected,
    ExecutorFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ConfigInvalid => "E1002",
            Self::RepositoryUnavailable => "E2001",
            Self::StoreUnavailable => "E3001",
            Self::QueueUnavailable => "E3002",
            Self::WorkerDisconnected => "E4001",
            Self::ExecutorFailed => "E4002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Allocator config parse error",
            Self::ConfigInvalid => "Allocator config violates an invariant",
            Self::RepositoryUnavailable => "Agent repository unavailable",
            Self::StoreUnavailable => "Key-value store unavailable",
            Self::QueueUnavailable => "Event queue unavailable",
            Self::WorkerDisconnected => "Shard worker disconnected",
            Self::ExecutorFailed => "Executor failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in agora.toml and retry."),
            Self::ConfigInvalid => {
                Some("Keep moderate < critical thresholds and factors within [0, 1].")
            }
            Self::RepositoryUnavailable => {
                Some("Check the agent repository backend; the event was not allocated.")
            }
            Self::StoreUnavailable => {
                Some("Check the lock/idempotency store; admission state may be stale.")
            }
            Self::QueueUnavailable => Some("Check the queue backend before resuming consumers."),
            Self::WorkerDisconnected => Some("Respawn the shard worker; its thread has exited."),
            Self::ExecutorFailed => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of a [`crate::store::KeyValueStore`] backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached or refused the operation.
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Collaborator faults that abort a single allocation or batch.
///
/// Admission rejections, quota exhaustion and lock conflicts are never
/// reported through this type; they are values in
/// [`crate::event::AllocationResult::skipped_reasons`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("agent repository unavailable for community {community_id}: {reason}")]
    Repository { community_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("event queue failure: {0}")]
    Queue(String),

    #[error("shard worker {shard} disconnected")]
    WorkerDisconnected { shard: String },

    #[error("shard worker could not be started: {0}")]
    WorkerSpawn(String),
}

impl AllocError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Repository { .. } => ErrorCode::RepositoryUnavailable,
            Self::Store(_) => ErrorCode::StoreUnavailable,
            Self::Queue(_) => ErrorCode::QueueUnavailable,
            Self::WorkerDisconnected { .. } => ErrorCode::WorkerDisconnected,
            Self::WorkerSpawn(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
