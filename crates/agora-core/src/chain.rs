//! Follow-up events for allocated agents.
//!
//! Each follow-up is one hop deeper than its parent, so admission's depth
//! ceiling bounds every cascade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AllocationResult, EventPayload, EventType};

/// Overrides applied to every derived event. `None` keeps the parent's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpOptions {
    /// Defaults to [`EventType::NewCommentCreated`].
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub community_id: Option<String>,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// One follow-up per allocated agent, authored by that agent.
///
/// Keys are derived from the parent (`<key>:<agent>`), so redelivering the
/// parent's allocation yields the same follow-ups and admission dedups them.
#[must_use]
pub fn derive_follow_up_events(
    original: &EventPayload,
    allocation: &AllocationResult,
    opts: &FollowUpOptions,
    created_at: DateTime<Utc>,
) -> Vec<EventPayload> {
    allocation
        .agents
        .iter()
        .map(|agent| EventPayload {
            event_id: format!("{}:chain:{}", original.event_id, agent.agent_id),
            event_type: opts.event_type.clone().unwrap_or(EventType::NewCommentCreated),
            idempotency_key: format!("{}:{}", original.idempotency_key, agent.agent_id),
            chain_depth: original.chain_depth.saturating_add(1),
            community_id: opts
                .community_id
                .clone()
                .unwrap_or_else(|| original.community_id.clone()),
            post_id: opts.post_id.clone().or_else(|| original.post_id.clone()),
            room_id: opts.room_id.clone().or_else(|| original.room_id.clone()),
            author_agent_id: agent.agent_id.clone(),
            created_at,
            tags: original.tags.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::degradation::DegradationLevel;
    use crate::event::SelectedAgent;
    use std::collections::BTreeMap;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).expect("valid timestamp")
    }

    fn allocation(agents: &[&str]) -> AllocationResult {
        AllocationResult {
            event_id: "evt-1".into(),
            quota_applied: 5,
            degradation_level: DegradationLevel::Normal,
            agents: agents
                .iter()
                .zip(1..)
                .map(|(id, priority)| SelectedAgent {
                    agent_id: (*id).to_string(),
                    score: 1.0,
                    priority,
                })
                .collect(),
            skipped_reasons: BTreeMap::new(),
        }
    }

    fn original() -> EventPayload {
        EventPayload::new("evt-1", EventType::NewPostCreated, "c1", "author", at(0))
            .with_post("p1")
            .with_idempotency_key("key-1")
            .with_chain_depth(2)
            .with_tags(["rust"])
    }

    #[test]
    fn one_follow_up_per_agent() {
        let events = derive_follow_up_events(
            &original(),
            &allocation(&["a", "b", "c"]),
            &FollowUpOptions::default(),
            at(5_000),
        );

        assert_eq!(events.len(), 3);
        let first = &events[0];
        assert_eq!(first.event_id, "evt-1:chain:a");
        assert_eq!(first.idempotency_key, "key-1:a");
        assert_eq!(first.author_agent_id, "a");
        assert_eq!(first.chain_depth, 3);
        assert_eq!(first.event_type, EventType::NewCommentCreated);
        assert_eq!(first.community_id, "c1");
        assert_eq!(first.post_id.as_deref(), Some("p1"));
        assert_eq!(first.created_at, at(5_000));
        assert_eq!(first.tags, vec!["rust"]);

        let keys: std::collections::HashSet<_> =
            events.iter().map(|e| e.idempotency_key.as_str()).collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn overrides_replace_parent_fields() {
        let opts = FollowUpOptions {
            event_type: Some(EventType::RoomTick),
            community_id: Some("c2".into()),
            post_id: None,
            room_id: Some("r9".into()),
        };
        let events = derive_follow_up_events(&original(), &allocation(&["a"]), &opts, at(0));
        assert_eq!(events[0].event_type, EventType::RoomTick);
        assert_eq!(events[0].community_id, "c2");
        assert_eq!(events[0].post_id.as_deref(), Some("p1"));
        assert_eq!(events[0].room_id.as_deref(), Some("r9"));
    }

    #[test]
    fn empty_allocation_yields_nothing() {
        let events = derive_follow_up_events(
            &original(),
            &allocation(&[]),
            &FollowUpOptions::default(),
            at(0),
        );
        assert!(events.is_empty());
    }
}
