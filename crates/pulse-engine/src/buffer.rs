//! The ordered queue of events waiting for delivery.

use std::collections::VecDeque;

use pulse_types::Event;

/// Events cut from the head of the buffer for one delivery attempt.
///
/// The transport owns the batch while the attempt runs. If it fails the
/// batch goes back through [`EventBuffer::requeue_front`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch(Vec<Event>);

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }

    pub fn into_events(self) -> Vec<Event> {
        self.0
    }
}

impl From<Vec<Event>> for PendingBatch {
    fn from(events: Vec<Event>) -> Self {
        Self(events)
    }
}

/// Unbounded FIFO of pending events.
///
/// The only ordering exception is a failed batch, which is put back ahead
/// of everything queued after it was cut. No deduplication happens here.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: VecDeque<Event>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` to the tail and returns the new length.
    pub fn enqueue(&mut self, event: Event) -> usize {
        self.events.push_back(event);
        self.events.len()
    }

    /// Removes up to `max` events from the head.
    ///
    /// An empty buffer yields an empty batch, which callers must not send.
    pub fn cut_batch(&mut self, max: usize) -> PendingBatch {
        let take = max.min(self.events.len());
        PendingBatch(self.events.drain(..take).collect())
    }

    /// Splices `batch` back at the head, keeping its internal order.
    pub fn requeue_front(&mut self, batch: PendingBatch) {
        for event in batch.0.into_iter().rev() {
            self.events.push_front(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Copies of the queued events, head first.
    pub fn to_vec(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Names of the queued events, head first.
    pub fn names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_types::Properties;

    fn event(name: &str) -> Event {
        Event {
            name: name.to_string(),
            distinct_id: None,
            session_id: "s".to_string(),
            timestamp_iso: "1970-01-01T00:00:00.000Z".to_string(),
            location_hint: None,
            properties: Properties::new(),
        }
    }

    #[test]
    fn cut_takes_from_head_up_to_max() {
        let mut buffer = EventBuffer::new();
        for name in ["a", "b", "c"] {
            buffer.enqueue(event(name));
        }

        let batch = buffer.cut_batch(2);

        let names: Vec<_> = batch.events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(buffer.names(), ["c"]);
    }

    #[test]
    fn cut_on_empty_buffer_is_empty() {
        let mut buffer = EventBuffer::new();
        assert!(buffer.cut_batch(10).is_empty());
    }

    #[test]
    fn requeued_batch_jumps_ahead_of_newer_events() {
        let mut buffer = EventBuffer::new();
        buffer.enqueue(event("a"));
        buffer.enqueue(event("b"));
        let batch = buffer.cut_batch(2);
        buffer.enqueue(event("c"));

        buffer.requeue_front(batch);

        assert_eq!(buffer.names(), ["a", "b", "c"]);
    }

    #[test]
    fn enqueue_reports_length() {
        let mut buffer = EventBuffer::new();
        assert_eq!(buffer.enqueue(event("a")), 1);
        assert_eq!(buffer.enqueue(event("a")), 2, "duplicates are kept");
    }
}
