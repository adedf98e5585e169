#![allow(dead_code)]

use agora_core::{AgentCandidate, AgentStatus, EventPayload, EventType};
use chrono::{DateTime, Utc};
use proptest::prelude::*;

pub const NOW_MS: i64 = 1_700_000_000_000;

pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(NOW_MS).unwrap_or_default()
}

pub fn arb_known_event_type() -> impl Strategy<Value = EventType> + Clone {
    prop::sample::select(EventType::KNOWN.to_vec())
}

pub fn arb_status() -> impl Strategy<Value = AgentStatus> + Clone {
    prop_oneof![
        6 => Just(AgentStatus::Active),
        1 => Just(AgentStatus::Limited),
        1 => Just(AgentStatus::Quarantined),
        1 => Just(AgentStatus::Banned),
    ]
}

pub fn arb_tag() -> impl Strategy<Value = String> + Clone {
    prop::sample::select(vec!["rust", "async", "gc", "wasm", "db", "ml"]).prop_map(String::from)
}

/// Agent `agent-<index>`; authors are drawn from the same id space so
/// self-responses are exercised.
pub fn arb_candidate(index: usize) -> impl Strategy<Value = AgentCandidate> {
    (
        arb_status(),
        prop::collection::vec(arb_tag(), 0..4),
        any::<bool>(),
        0u32..40,
        0u64..150_000,
        prop::option::of(0i64..600_000),
    )
        .prop_map(
            move |(status, tags, member, actions, tokens, last_action_ago_ms)| {
                let mut candidate = AgentCandidate::active(format!("agent-{index}"))
                    .with_status(status)
                    .with_tags(tags);
                if member {
                    candidate = candidate.in_community("c-0");
                }
                candidate.actions_last_hour = actions;
                candidate.tokens_last_day = tokens;
                candidate.last_action_at = last_action_ago_ms
                    .and_then(|ago| DateTime::from_timestamp_millis(NOW_MS - ago));
                candidate
            },
        )
}

pub fn arb_pool(max: usize) -> impl Strategy<Value = Vec<AgentCandidate>> {
    (0..=max).prop_flat_map(|size| {
        (0..size)
            .map(arb_candidate)
            .collect::<Vec<_>>()
    })
}

pub fn arb_event() -> impl Strategy<Value = EventPayload> {
    (
        "[a-z0-9]{1,12}",
        arb_known_event_type(),
        0usize..30,
        0u32..8,
        prop::option::of(prop::sample::select(vec!["p-1", "p-2", "p-3"])),
        prop::collection::vec(arb_tag(), 0..3),
    )
        .prop_map(|(id, event_type, author, depth, post, tags)| {
            let mut event =
                EventPayload::new(id, event_type, "c-0", format!("agent-{author}"), now())
                    .with_chain_depth(depth)
                    .with_tags(tags);
            if let Some(post) = post {
                event = event.with_post(post);
            }
            event
        })
}
