// Bounded record of recently dispatched alerts, queryable by age.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::model::AlertEvent;

pub const WINDOW_CAPACITY: usize = 50;

#[derive(Debug)]
pub struct ActiveAlertWindow {
    events: VecDeque<AlertEvent>,
    capacity: usize,
}

impl Default for ActiveAlertWindow {
    fn default() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }
}

impl ActiveAlertWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append, dropping the oldest entry once over capacity.
    pub fn push(&mut self, event: AlertEvent) {
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Events no older than `max_age` at `now`, oldest first. Events stamped
    /// after `now` count as age zero.
    pub fn recent(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<AlertEvent> {
        self.events
            .iter()
            .filter(|event| (now - event.timestamp).to_std().unwrap_or_default() <= max_age)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
