use chrono::{DateTime, Utc};

use super::alerts::cooldown::CooldownGate;
use super::config::AlertConfig;
use super::tracker::TrackStore;

/// Mutable engine state shared across frames. Always accessed under the
/// engine's single lock so track appends and cooldown check-and-set are atomic.
#[derive(Debug, Default)]
pub struct EngineState {
    pub tracks: TrackStore,
    pub cooldowns: CooldownGate,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop stale tracks and expired cooldown entries before a frame is evaluated.
    pub fn expire(&mut self, now: DateTime<Utc>, config: &AlertConfig) {
        let evicted = self.tracks.evict_stale(now, config.track_ttl());
        if evicted > 0 {
            log::debug!("Evicted {} stale tracks, {} remain", evicted, self.tracks.len());
        }
        self.cooldowns.prune(now, config.cooldown());
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cooldowns.clear();
    }
}
