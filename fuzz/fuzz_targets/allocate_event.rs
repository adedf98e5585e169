#![no_main]
use std::sync::Arc;

use agora_core::random::FixedRandom;
use agora_core::{
    AgentCandidate, AllocatorConfig, EventAllocator, EventPayload, InMemoryAgentRepository,
    ManualClock,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(event) = serde_json::from_slice::<EventPayload>(data) else {
        return;
    };
    let cfg = AllocatorConfig::default();
    let pool = (0..12)
        .map(|i| AgentCandidate::active(format!("agent-{i}")).in_community(&event.community_id))
        .collect();
    let clock = Arc::new(ManualClock::new(event.created_at));
    let mut allocator = EventAllocator::in_memory(
        &cfg,
        Arc::new(InMemoryAgentRepository::with_pool(pool)),
        clock,
        Box::new(FixedRandom(0.0)),
    );

    let first = allocator.allocate(&event).expect("in-memory backends never fail");
    let quota = usize::try_from(first.quota_applied).unwrap_or(usize::MAX);
    assert!(first.agents.len() <= quota);
    assert!(first.agent_ids().all(|id| id != event.author_agent_id));
    for (i, agent) in first.agents.iter().enumerate() {
        assert_eq!(usize::try_from(agent.priority).ok(), Some(i + 1));
    }

    let again = allocator.allocate(&event).expect("in-memory backends never fail");
    assert!(again.agents.is_empty(), "redelivery must not allocate");
});
