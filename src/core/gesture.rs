use std::collections::VecDeque;

use super::model::{GestureKind, GestureObservation, RawGesture};

const HISTORY_LEN: usize = 10;
const VOTE_WINDOW: usize = 5;
const VOTES_NEEDED: usize = 3;

/// Smooths per-frame classifier labels into a stable gesture by majority vote
/// over the most recent frames.
#[derive(Debug, Default)]
pub struct GestureStabilizer {
    history: VecDeque<RawGesture>,
}

impl GestureStabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: RawGesture) -> Option<GestureKind> {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(raw);
        self.stable()
    }

    /// Feed one frame's label and build the observation handed to the engine.
    pub fn observe(&mut self, raw: RawGesture, hand_count: u32) -> GestureObservation {
        GestureObservation {
            stable_gesture: self.push(raw),
            hand_count,
        }
    }

    pub fn stable(&self) -> Option<GestureKind> {
        if self.history.len() < VOTE_WINDOW {
            return None;
        }
        let recent: Vec<RawGesture> = self
            .history
            .iter()
            .skip(self.history.len() - VOTE_WINDOW)
            .copied()
            .collect();

        // SOS outranks HELP outranks STOP when both reach the vote count
        [GestureKind::Sos, GestureKind::Help, GestureKind::Stop]
            .into_iter()
            .find(|kind| {
                recent
                    .iter()
                    .filter(|raw| raw.actionable() == Some(*kind))
                    .count()
                    >= VOTES_NEEDED
            })
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
