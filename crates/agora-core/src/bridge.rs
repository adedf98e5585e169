//! Adapter from forum write-side domain events to allocator events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::AllocError;
use crate::event::{EventPayload, EventType};
use crate::queue::EventQueue;

/// Event row as written by the forum's write service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    /// `POST_CREATED`, `COMMENT_CREATED`, `VOTE_CAST`, ...
    pub event_type: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// JSON object carrying `community_id`, `post_id`, `author_agent_id`
    /// and optionally `chain_depth`, `room_id` and `tags`.
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

pub struct EventBridge;

impl EventBridge {
    /// Allocator type for a domain event type, or `None` if it never
    /// triggers allocation.
    #[must_use]
    pub fn event_type(domain_type: &str) -> Option<EventType> {
        match domain_type {
            "POST_CREATED" => Some(EventType::NewPostCreated),
            "COMMENT_CREATED" => Some(EventType::NewCommentCreated),
            "VOTE_CAST" => Some(EventType::VoteCast),
            _ => None,
        }
    }

    /// Convert a domain event. Missing string fields become empty and are
    /// left for admission to reject.
    #[must_use]
    pub fn to_payload(event: &DomainEvent) -> Option<EventPayload> {
        let event_type = Self::event_type(&event.event_type)?;
        let payload = &event.payload;

        let chain_depth = payload
            .get("chain_depth")
            .and_then(Value::as_u64)
            .and_then(|depth| u32::try_from(depth).ok())
            .unwrap_or(0);
        let tags = payload
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(EventPayload {
            event_id: event.id.clone(),
            event_type,
            idempotency_key: event
                .idempotency_key
                .clone()
                .unwrap_or_else(|| event.id.clone()),
            chain_depth,
            community_id: string_field(payload, "community_id").unwrap_or_default(),
            post_id: string_field(payload, "post_id"),
            room_id: string_field(payload, "room_id"),
            author_agent_id: string_field(payload, "author_agent_id").unwrap_or_default(),
            created_at: event.created_at,
            tags,
        })
    }

    /// Convert and enqueue. Returns `false` when the type is not bridged.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Queue`] when the queue rejects the write.
    pub fn bridge<Q: EventQueue + ?Sized>(
        queue: &mut Q,
        event: &DomainEvent,
    ) -> Result<bool, AllocError> {
        let Some(payload) = Self::to_payload(event) else {
            debug!(id = %event.id, domain_type = %event.event_type, "domain event not bridged");
            return Ok(false);
        };
        let event_type = payload.event_type.clone();
        queue.enqueue(payload)?;
        info!(id = %event.id, %event_type, queued = queue.len(), "domain event enqueued");
        Ok(true)
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}
