#![no_main]
use agora_core::{DomainEvent, EventBridge, EventQueue, InMemoryEventQueue};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(event) = serde_json::from_slice::<DomainEvent>(data) else {
        return;
    };
    let payload = EventBridge::to_payload(&event);
    assert_eq!(payload.is_some(), EventBridge::event_type(&event.event_type).is_some());

    let mut queue = InMemoryEventQueue::new();
    let bridged = EventBridge::bridge(&mut queue, &event).expect("in-memory queue never fails");
    assert_eq!(bridged, payload.is_some());
    assert_eq!(queue.len(), usize::from(bridged));
});
