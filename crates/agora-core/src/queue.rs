//! FIFO of pending events.

use std::collections::VecDeque;

use crate::error::AllocError;
use crate::event::EventPayload;

/// Strict FIFO queue of events awaiting allocation.
///
/// `oldest_timestamp_ms` is the head's `created_at`; the consumer derives
/// queue lag from it.
pub trait EventQueue: Send {
    /// # Errors
    ///
    /// Returns [`AllocError::Queue`] when the backend rejects the write.
    fn enqueue(&mut self, event: EventPayload) -> Result<(), AllocError>;

    /// Remove the head, or `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Queue`] when the backend is unreachable.
    fn dequeue(&mut self) -> Result<Option<EventPayload>, AllocError>;

    /// # Errors
    ///
    /// Returns [`AllocError::Queue`] when the backend is unreachable.
    fn peek(&self) -> Result<Option<EventPayload>, AllocError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn oldest_timestamp_ms(&self) -> Option<i64>;

    fn clear(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryEventQueue {
    events: VecDeque<EventPayload>,
}

impl InMemoryEventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FromIterator<EventPayload> for InMemoryEventQueue {
    fn from_iter<I: IntoIterator<Item = EventPayload>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl EventQueue for InMemoryEventQueue {
    fn enqueue(&mut self, event: EventPayload) -> Result<(), AllocError> {
        self.events.push_back(event);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<Option<EventPayload>, AllocError> {
        Ok(self.events.pop_front())
    }

    fn peek(&self) -> Result<Option<EventPayload>, AllocError> {
        Ok(self.events.front().cloned())
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn oldest_timestamp_ms(&self) -> Option<i64> {
        self.events
            .front()
            .map(|event| event.created_at.timestamp_millis())
    }

    fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use chrono::DateTime;

    fn event(id: &str, ms: i64) -> EventPayload {
        EventPayload::new(
            id,
            EventType::NewCommentCreated,
            "c1",
            "a1",
            DateTime::from_timestamp_millis(ms).expect("valid timestamp"),
        )
    }

    #[test]
    fn fifo_order_and_oldest_timestamp() -> Result<(), AllocError> {
        let mut queue = InMemoryEventQueue::new();
        assert!(queue.dequeue()?.is_none());
        assert!(queue.oldest_timestamp_ms().is_none());

        queue.enqueue(event("e1", 1_000))?;
        queue.enqueue(event("e2", 500))?;
        assert_eq!(queue.oldest_timestamp_ms(), Some(1_000));
        assert_eq!(queue.peek()?.map(|e| e.event_id), Some("e1".into()));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue()?.map(|e| e.event_id), Some("e1".into()));
        assert_eq!(queue.oldest_timestamp_ms(), Some(500));

        queue.clear();
        assert!(queue.is_empty());
        Ok(())
    }
}
