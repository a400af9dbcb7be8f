// Per-key cooldown gate: suppresses repeats of the same alert key within a window.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::model::AlertKey;

#[derive(Debug, Default)]
pub struct CooldownGate {
    last_fired: HashMap<AlertKey, DateTime<Utc>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set. Allows the key on first sight or once strictly more than
    /// `window` has passed since it last fired, recording `now` as the new
    /// firing time. A denied call leaves the entry untouched.
    pub fn allow(&mut self, key: &AlertKey, now: DateTime<Utc>, window: Duration) -> bool {
        if let Some(last) = self.last_fired.get(key) {
            // Out-of-order timestamps (now < last) never pass
            let elapsed = match (now - *last).to_std() {
                Ok(elapsed) => elapsed,
                Err(_) => return false,
            };
            if elapsed <= window {
                return false;
            }
        }
        self.last_fired.insert(key.clone(), now);
        true
    }

    pub fn last_fired(&self, key: &AlertKey) -> Option<DateTime<Utc>> {
        self.last_fired.get(key).copied()
    }

    /// Forget entries that can no longer suppress anything under `window`.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let before = self.last_fired.len();
        self.last_fired.retain(|_, last| match (now - *last).to_std() {
            Ok(elapsed) => elapsed <= window,
            Err(_) => true,
        });
        let pruned = before - self.last_fired.len();
        if pruned > 0 {
            log::debug!("Pruned {} expired cooldown entries", pruned);
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}
