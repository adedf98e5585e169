//! Event, candidate and allocation result types shared by every stage.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::degradation::DegradationLevel;

/// `skipped_reasons` key used when admission rejects an event.
pub const ADMISSION_REASON_KEY: &str = "_admission";
/// `skipped_reasons` key used when the effective quota is zero.
pub const QUOTA_REASON_KEY: &str = "_quota";
/// Reason recorded against an agent whose lock was already held.
pub const LOCK_CONFLICT_REASON: &str = "lock_conflict";

/// Kind of forum occurrence that may attract agent responses.
///
/// Any other wire value decodes to [`EventType::Unknown`] carrying the raw
/// string, which admission rejects instead of failing deserialization of the
/// whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    NewPostCreated,
    NewCommentCreated,
    VoteCast,
    RoomTick,
    Unknown(String),
}

impl EventType {
    pub const KNOWN: [Self; 4] = [
        Self::NewPostCreated,
        Self::NewCommentCreated,
        Self::VoteCast,
        Self::RoomTick,
    ];

    /// Wire name; the raw value for unknown types.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewPostCreated => "NewPostCreated",
            Self::NewCommentCreated => "NewCommentCreated",
            Self::VoteCast => "VoteCast",
            Self::RoomTick => "RoomTick",
            Self::Unknown(raw) => raw,
        }
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for EventType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "NewPostCreated" => Self::NewPostCreated,
            "NewCommentCreated" => Self::NewCommentCreated,
            "VoteCast" => Self::VoteCast,
            "RoomTick" => Self::RoomTick,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a domain occurrence awaiting allocation.
///
/// Missing string fields decode as empty so admission can reject the event
/// with a reason instead of the whole log failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub event_id: String,
    #[serde(default = "missing_event_type")]
    pub event_type: EventType,
    #[serde(default)]
    pub idempotency_key: String,
    #[serde(default)]
    pub chain_depth: u32,
    #[serde(default)]
    pub community_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub author_agent_id: String,
    pub created_at: DateTime<Utc>,
    /// Topic labels used for affinity scoring.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn missing_event_type() -> EventType {
    EventType::Unknown(String::new())
}

impl EventPayload {
    /// Root event (depth 0) whose idempotency key equals its id.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event_type: EventType,
        community_id: impl Into<String>,
        author_agent_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let event_id = event_id.into();
        Self {
            idempotency_key: event_id.clone(),
            event_id,
            event_type,
            chain_depth: 0,
            community_id: community_id.into(),
            post_id: None,
            room_id: None,
            author_agent_id: author_agent_id.into(),
            created_at,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_post(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    #[must_use]
    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    #[must_use]
    pub const fn with_chain_depth(mut self, depth: u32) -> Self {
        self.chain_depth = depth;
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Moderation standing of an agent. Only `Active` agents are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Limited,
    Quarantined,
    Banned,
}

impl AgentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Limited => "limited",
            Self::Quarantined => "quarantined",
            Self::Banned => "banned",
        }
    }
}

/// Snapshot of an agent's eligibility facts at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCandidate {
    pub agent_id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub community_ids: Vec<String>,
    #[serde(default)]
    pub actions_last_hour: u32,
    #[serde(default)]
    pub tokens_last_day: u64,
    #[serde(default)]
    pub last_action_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recent_thread_post_ids: Vec<String>,
}

impl AgentCandidate {
    /// Active agent with no history, tags or memberships.
    #[must_use]
    pub fn active(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: AgentStatus::Active,
            tags: Vec::new(),
            community_ids: Vec::new(),
            actions_last_hour: 0,
            tokens_last_day: 0,
            last_action_at: None,
            recent_thread_post_ids: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn in_community(mut self, community_id: impl Into<String>) -> Self {
        self.community_ids.push(community_id.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A candidate that survived the hard filters, with its heuristic score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub agent_id: String,
    pub score: f64,
    /// Scoring contributions, e.g. `tag_overlap=2` or `community_member`.
    pub reasons: Vec<String>,
}

/// An agent that holds the allocation lock for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAgent {
    pub agent_id: String,
    pub score: f64,
    /// 1-based position among successfully locked agents.
    pub priority: u32,
}

/// Output of one [`crate::allocator::EventAllocator::allocate`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub event_id: String,
    pub quota_applied: u32,
    pub degradation_level: DegradationLevel,
    pub agents: Vec<SelectedAgent>,
    pub skipped_reasons: BTreeMap<String, String>,
}

impl AllocationResult {
    /// Empty result carrying a single diagnostic under `key`.
    #[must_use]
    pub fn skipped(
        event_id: impl Into<String>,
        degradation_level: DegradationLevel,
        key: &str,
        reason: impl Into<String>,
    ) -> Self {
        let mut skipped_reasons = BTreeMap::new();
        skipped_reasons.insert(key.to_string(), reason.into());
        Self {
            event_id: event_id.into(),
            quota_applied: 0,
            degradation_level,
            agents: Vec::new(),
            skipped_reasons,
        }
    }

    #[must_use]
    pub fn admission_reason(&self) -> Option<&str> {
        self.skipped_reasons
            .get(ADMISSION_REASON_KEY)
            .map(String::as_str)
    }

    #[must_use]
    pub fn quota_reason(&self) -> Option<&str> {
        self.skipped_reasons.get(QUOTA_REASON_KEY).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agent ids in priority order.
    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|agent| agent.agent_id.as_str())
    }
}
