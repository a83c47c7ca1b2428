use std::collections::VecDeque;

use crate::types::ObservationEvent;

/// Fixed-capacity ring of observation events, oldest first
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<ObservationEvent>,
    capacity: usize,
    total_ingested: u64,
    evicted: u64,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_ingested: 0,
            evicted: 0,
        }
    }

    /// Append an event, evicting the oldest one when full
    pub fn push(&mut self, event: ObservationEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
        self.total_ingested += 1;
    }

    /// Clone of the current contents in arrival order
    pub fn snapshot(&self) -> Vec<ObservationEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_ingested(&self) -> u64 {
        self.total_ingested
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn latest_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.events.back().map(|e| e.timestamp)
    }
}
