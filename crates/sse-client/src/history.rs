//! Bounded history of received events.

use std::collections::VecDeque;

use crate::{DEFAULT_MAX_MESSAGES, StreamEvent};

/// FIFO of the most recent events, plus the single latest one.
///
/// `last` tracks the newest appended event regardless of capacity, so a
/// zero-capacity history still reports its latest event.
#[derive(Debug, Clone)]
pub struct BoundedHistory {
    capacity: usize,
    buffer: VecDeque<StreamEvent>,
    last: Option<StreamEvent>,
}

impl Default for BoundedHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

impl BoundedHistory {
    /// Create a history holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_MESSAGES)),
            last: None,
        }
    }

    /// Append an event, evicting the oldest ones past capacity.
    pub fn append(&mut self, event: StreamEvent) {
        self.last = Some(event.clone());
        self.buffer.push_back(event);
        self.trim();
    }

    fn trim(&mut self) {
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }
    }

    /// Most recently appended event.
    #[must_use]
    pub const fn last(&self) -> Option<&StreamEvent> {
        self.last.as_ref()
    }

    /// Buffered events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &StreamEvent> {
        self.buffer.iter()
    }

    /// Copy of the buffered events, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<StreamEvent> {
        self.buffer.iter().cloned().collect()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all buffered events and the latest one.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    fn event(data: &str) -> StreamEvent {
        StreamEvent::from_frame(&Frame::new(data))
    }

    fn texts(history: &BoundedHistory) -> Vec<String> {
        history
            .iter()
            .map(|e| e.data.as_text().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = BoundedHistory::new(2);
        history.append(event("A"));
        history.append(event("B"));
        history.append(event("C"));

        assert_eq!(texts(&history), vec!["B", "C"]);
        assert_eq!(history.last(), Some(&event("C")));
    }

    #[test]
    fn test_zero_capacity_still_tracks_last() {
        let mut history = BoundedHistory::new(0);
        history.append(event("only"));

        assert!(history.is_empty());
        assert_eq!(history.last(), Some(&event("only")));
    }

    #[test]
    fn test_under_capacity_keeps_everything() {
        let mut history = BoundedHistory::default();
        for i in 0..10 {
            history.append(event(&format!("e{i}")));
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.capacity(), DEFAULT_MAX_MESSAGES);
        assert_eq!(history.to_vec().first(), Some(&event("e0")));
    }

    #[test]
    fn test_clear() {
        let mut history = BoundedHistory::new(3);
        history.append(event("x"));
        history.clear();
        assert!(history.is_empty());
        assert!(history.last().is_none());
    }
}
