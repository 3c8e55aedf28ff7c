//! Event queue for records awaiting upload

use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

use mcs_types::{EventRecord, Events};

/// Event queue errors
#[derive(Debug, Error)]
pub enum EventQueueError {
    #[error("Queue is full (max size: {0})")]
    QueueFull(usize),

    #[error("Duplicate event: {0}")]
    DuplicateEvent(String),
}

/// Bounded FIFO of events. Records leave the queue only when a send
/// succeeds or their TTL runs out.
#[derive(Debug)]
pub struct EventQueue {
    max_size: usize,
    queue: VecDeque<EventRecord>,
    ids: HashSet<String>,
}

impl EventQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            queue: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    pub fn enqueue(&mut self, record: EventRecord) -> Result<(), EventQueueError> {
        if self.queue.len() >= self.max_size {
            warn!(
                queue_size = self.queue.len(),
                max_size = self.max_size,
                "Event queue is full"
            );
            return Err(EventQueueError::QueueFull(self.max_size));
        }

        if self.ids.contains(&record.id) {
            return Err(EventQueueError::DuplicateEvent(record.id));
        }

        debug!(
            event_id = %record.id,
            app_id = %record.app_id,
            queue_size = self.queue.len() + 1,
            "Event enqueued"
        );
        self.ids.insert(record.id.clone());
        self.queue.push_back(record);
        Ok(())
    }

    /// Drop expired records, returning how many were removed
    pub fn purge_expired(&mut self, now_millis: u64) -> usize {
        let before = self.queue.len();
        let ids = &mut self.ids;
        self.queue.retain(|record| {
            if record.is_expired(now_millis) {
                debug!(event_id = %record.id, app_id = %record.app_id, "Event expired before sending");
                ids.remove(&record.id);
                false
            } else {
                true
            }
        });
        before - self.queue.len()
    }

    /// Snapshot of the queued records for one send attempt
    pub fn batch(&self) -> Events {
        Events::new(self.queue.iter().cloned().collect())
    }

    /// Remove the records of a batch that was sent successfully
    pub fn acknowledge(&mut self, sent: &Events) {
        let sent: HashSet<&str> = sent.records.iter().map(|r| r.id.as_str()).collect();
        let ids = &mut self.ids;
        self.queue.retain(|record| {
            if sent.contains(record.id.as_str()) {
                ids.remove(&record.id);
                false
            } else {
                true
            }
        });
        debug!(remaining = self.queue.len(), "Events acknowledged");
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.max_size
    }

    /// Records that can still be enqueued
    pub fn free_slots(&self) -> usize {
        self.max_size.saturating_sub(self.queue.len())
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.ids.clear();
        debug!("Event queue cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, timestamp: u64) -> EventRecord {
        EventRecord::new(id, "ALC", "<event/>", timestamp)
    }

    #[test]
    fn test_enqueue_and_batch() {
        let mut queue = EventQueue::new(10);
        queue.enqueue(event("e1", 0)).unwrap();
        queue.enqueue(event("e2", 0)).unwrap();

        let batch = queue.batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records[0].id, "e1");
        // Batching does not drain
        assert_eq!(queue.size(), 2);
    }

    #[test]
    fn test_queue_full() {
        let mut queue = EventQueue::new(2);
        queue.enqueue(event("e1", 0)).unwrap();
        queue.enqueue(event("e2", 0)).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.free_slots(), 0);

        let result = queue.enqueue(event("e3", 0));
        assert!(matches!(result.unwrap_err(), EventQueueError::QueueFull(2)));
    }

    #[test]
    fn test_duplicate_event() {
        let mut queue = EventQueue::new(10);
        queue.enqueue(event("e1", 0)).unwrap();
        let result = queue.enqueue(event("e1", 5));
        assert!(matches!(result.unwrap_err(), EventQueueError::DuplicateEvent(_)));
    }

    #[test]
    fn test_acknowledge_keeps_records_added_after_batch() {
        let mut queue = EventQueue::new(10);
        queue.enqueue(event("e1", 0)).unwrap();
        let batch = queue.batch();
        queue.enqueue(event("e2", 0)).unwrap();

        queue.acknowledge(&batch);
        assert_eq!(queue.size(), 1);
        assert_eq!(queue.batch().records[0].id, "e2");

        // Acknowledged ids may be reused
        queue.enqueue(event("e1", 0)).unwrap();
    }

    #[test]
    fn test_purge_expired() {
        let mut queue = EventQueue::new(10);
        queue.enqueue(event("old", 0).with_ttl(1000)).unwrap();
        queue.enqueue(event("new", 5000).with_ttl(1000)).unwrap();

        assert_eq!(queue.purge_expired(5500), 1);
        assert_eq!(queue.batch().records[0].id, "new");
    }
}
