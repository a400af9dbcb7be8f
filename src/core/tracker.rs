use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::model::{Point, TrackId};

/// Positions kept per track; older samples are dropped first.
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub point: Point,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TrackRecord {
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    history: VecDeque<PositionSample>,
}

impl TrackRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    pub fn history(&self) -> &VecDeque<PositionSample> {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Time between first sighting and `now`; zero if `now` predates it.
    pub fn dwell(&self, now: DateTime<Utc>) -> Duration {
        (now - self.first_seen).to_std().unwrap_or_default()
    }
}

/// Per-track motion history keyed by upstream track id.
#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<TrackId, TrackRecord>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a position, creating the track on first sighting.
    pub fn observe(&mut self, track_id: TrackId, point: Point, now: DateTime<Utc>) {
        let record = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| TrackRecord::new(now));
        if record.history.len() == HISTORY_CAPACITY {
            record.history.pop_front();
        }
        record.history.push_back(PositionSample {
            point,
            timestamp: now,
        });
        if now > record.last_seen {
            record.last_seen = now;
        }
    }

    pub fn get(&self, track_id: TrackId) -> Option<&TrackRecord> {
        self.tracks.get(&track_id)
    }

    pub fn first_seen(&self, track_id: TrackId) -> Option<DateTime<Utc>> {
        self.tracks.get(&track_id).map(TrackRecord::first_seen)
    }

    /// Recorded positions, oldest first. Empty for unknown tracks.
    pub fn history(&self, track_id: TrackId) -> impl Iterator<Item = &PositionSample> {
        self.tracks
            .get(&track_id)
            .into_iter()
            .flat_map(|record| record.history.iter())
    }

    pub fn remove(&mut self, track_id: TrackId) -> Option<TrackRecord> {
        self.tracks.remove(&track_id)
    }

    /// Drop tracks not observed within `ttl` of `now`. Returns how many were removed.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|track_id, record| {
            let idle = (now - record.last_seen).to_std().unwrap_or_default();
            let keep = idle <= ttl;
            if !keep {
                log::debug!("Evicting track {} after {:.1}s unseen", track_id, idle.as_secs_f64());
            }
            keep
        });
        before - self.tracks.len()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_seen_set_once() {
        let mut store = TrackStore::new();
        store.observe(1, Point::new(0.0, 0.0), at(0));
        store.observe(1, Point::new(5.0, 0.0), at(3));
        assert_eq!(store.first_seen(1), Some(at(0)));
        assert_eq!(store.get(1).unwrap().last_seen(), at(3));
        assert_eq!(store.get(1).unwrap().dwell(at(10)), Duration::from_secs(10));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = TrackStore::new();
        for i in 0..60 {
            store.observe(9, Point::new(i as f64, 0.0), at(i));
        }
        let history: Vec<_> = store.history(9).collect();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history[0].point.x, 10.0);
        assert_eq!(history[HISTORY_CAPACITY - 1].point.x, 59.0);
    }

    #[test]
    fn test_unknown_track_reads_empty() {
        let store = TrackStore::new();
        assert_eq!(store.history(404).count(), 0);
        assert!(store.first_seen(404).is_none());
    }

    #[test]
    fn test_evict_stale_tracks() {
        let mut store = TrackStore::new();
        store.observe(1, Point::new(0.0, 0.0), at(0));
        store.observe(2, Point::new(0.0, 0.0), at(25));

        let removed = store.evict_stale(at(40), Duration::from_secs(30));
        assert_eq!(removed, 1);
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_some());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = TrackStore::new();
        store.observe(1, Point::new(0.0, 0.0), at(0));
        store.observe(2, Point::new(0.0, 0.0), at(0));
        assert!(store.remove(1).is_some());
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }
}
