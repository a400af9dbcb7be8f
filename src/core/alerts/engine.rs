// Alert engine - evaluates rules for each frame and gates candidates through cooldowns.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::model::AlertEvent;
use super::triggers::{
    evaluate_fall, evaluate_gesture, evaluate_loitering, evaluate_occupancy,
    evaluate_restricted_zone, evaluate_suspicious_movement, TriggerContext,
};
use crate::core::config::{AlertConfig, ConfigError, ConfigPatch};
use crate::core::model::{DetectionResult, GestureObservation};
use crate::core::state::EngineState;

/// Owns all cross-frame alert state. Safe to share between threads: each
/// frame is evaluated under one lock, so cooldown decisions for a key follow
/// the order in which frames acquire it.
pub struct AlertEngine {
    config: RwLock<AlertConfig>,
    state: Mutex<EngineState>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

impl AlertEngine {
    /// Build an engine. An invalid config is replaced by the defaults.
    pub fn new(config: AlertConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("Invalid alert config ({}), using defaults", e);
                AlertConfig::default()
            }
        };
        Self {
            config: RwLock::new(config),
            state: Mutex::new(EngineState::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> AlertConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole config. Rejected configs leave the current one in place.
    pub fn set_config(&self, config: AlertConfig) -> Result<(), ConfigError> {
        if let Err(e) = config.validate() {
            log::warn!("Rejected config update: {}", e);
            return Err(e);
        }
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        log::info!("Alert config replaced");
        Ok(())
    }

    /// Apply a partial update; takes effect on the next evaluated frame.
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<AlertConfig, ConfigError> {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        match current.patched(patch) {
            Ok(next) => {
                *current = next.clone();
                log::info!("Alert config updated: {:?}", patch);
                Ok(next)
            }
            Err(e) => {
                log::warn!("Rejected config update: {}", e);
                Err(e)
            }
        }
    }

    /// Evaluate one frame and return the alerts that passed the cooldown gate.
    ///
    /// Candidates are generated in fixed priority order (gesture, occupancy,
    /// per-track loitering and movement, falls, zones) and gated in that order.
    /// A missing or skipped detection result returns nothing and leaves all
    /// state untouched.
    pub fn process_events(
        &self,
        detections: Option<&DetectionResult>,
        gesture: Option<&GestureObservation>,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let result = match detections {
            Some(result) if !result.skipped => result,
            _ => return Vec::new(),
        };
        let config = self.config();
        let mut state = self.state();
        state.expire(now, &config);

        // Record each tracked person's position once for this frame
        for person in result.persons() {
            if let Some(track_id) = person.track_id {
                if person.center.is_finite() {
                    state.tracks.observe(track_id, person.center, now);
                } else {
                    log::warn!("Track {} has a non-finite center, not recorded", track_id);
                }
            }
        }

        let candidates = {
            let ctx = TriggerContext {
                config: &config,
                tracks: &state.tracks,
                now,
            };
            let mut candidates = Vec::new();

            if let Some(alert) = gesture.and_then(|g| evaluate_gesture(g, now)) {
                candidates.push(alert);
            }
            if let Some(alert) = evaluate_occupancy(result.person_count(), &ctx) {
                candidates.push(alert);
            }
            for person in result.persons().filter(|p| p.track_id.is_some()) {
                candidates.extend(evaluate_loitering(person, &ctx));
                candidates.extend(evaluate_suspicious_movement(person, &ctx));
            }
            for person in result.persons() {
                candidates.extend(evaluate_fall(person, &ctx));
            }
            for person in result.persons().filter(|p| p.center.is_finite()) {
                for zone in &config.restricted_zones {
                    candidates.extend(evaluate_restricted_zone(person, zone, &ctx));
                }
            }
            candidates
        };

        let window = config.cooldown();
        candidates
            .into_iter()
            .filter(|alert| {
                let key = alert.key();
                let allowed = state.cooldowns.allow(&key, now, window);
                if !allowed {
                    log::debug!("Suppressed {} (cooldown)", key);
                }
                allowed
            })
            .collect()
    }

    pub fn track_count(&self) -> usize {
        self.state().tracks.len()
    }

    /// Forget all tracks and cooldowns. Config is kept.
    pub fn reset(&self) {
        self.state().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{AlertDetails, AlertType};
    use crate::core::model::{BoundingBox, Detection, GestureKind};
    use crate::core::zones::Zone;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn make_detection(class_name: &str, track_id: Option<i64>, bbox: BoundingBox) -> Detection {
        Detection {
            bbox,
            confidence: 0.8,
            class_name: class_name.to_string(),
            track_id,
            center: bbox.center(),
            area: bbox.area(),
            timestamp: t0(),
        }
    }

    fn person_at(track_id: i64, x: f64, y: f64) -> Detection {
        make_detection(
            "person",
            Some(track_id),
            BoundingBox::new(x - 20.0, y - 50.0, x + 20.0, y + 50.0),
        )
    }

    fn crowd(n: i64) -> DetectionResult {
        DetectionResult::new((0..n).map(|i| person_at(i, 1000.0 + i as f64 * 60.0, 500.0)).collect())
    }

    #[test]
    fn test_absent_or_skipped_result_is_noop() {
        let engine = AlertEngine::default();
        let sos = GestureObservation {
            stable_gesture: Some(GestureKind::Sos),
            hand_count: 1,
        };
        assert!(engine.process_events(None, Some(&sos), t0()).is_empty());
        assert!(engine
            .process_events(Some(&DetectionResult::skipped()), Some(&sos), t0())
            .is_empty());
        assert_eq!(engine.track_count(), 0);

        // Gesture still gated normally afterwards: nothing was recorded
        let alerts = engine.process_events(Some(&DetectionResult::default()), Some(&sos), t0());
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_gesture_generated_first() {
        let engine = AlertEngine::default();
        let help = GestureObservation {
            stable_gesture: Some(GestureKind::Help),
            hand_count: 1,
        };
        let alerts = engine.process_events(Some(&crowd(6)), Some(&help), t0());
        let types: Vec<_> = alerts.iter().map(|a| a.alert_type).collect();
        assert_eq!(types, vec![AlertType::HelpGesture, AlertType::CrowdDetected]);
    }

    #[test]
    fn test_only_persons_counted() {
        let engine = AlertEngine::default();
        let mut result = crowd(3);
        for _ in 0..5 {
            result.detections.push(make_detection(
                "car",
                None,
                BoundingBox::new(0.0, 0.0, 300.0, 100.0),
            ));
        }
        assert!(engine.process_events(Some(&result), None, t0()).is_empty());
    }

    #[test]
    fn test_fall_without_track_id() {
        let engine = AlertEngine::default();
        let lying = make_detection("person", None, BoundingBox::new(0.0, 0.0, 200.0, 80.0));
        let alerts = engine.process_events(Some(&DetectionResult::new(vec![lying])), None, t0());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::FallDetected);
        assert_eq!(engine.track_count(), 0);
    }

    #[test]
    fn test_zone_key_shared_within_zone() {
        let mut config = AlertConfig::default();
        config.restricted_zones = vec![
            Zone::rectangle("vault", 0.0, 0.0, 500.0, 500.0),
            Zone::rectangle("dock", 400.0, 0.0, 900.0, 500.0),
        ];
        let engine = AlertEngine::new(config);

        let frame = DetectionResult::new(vec![person_at(1, 100.0, 100.0), person_at(2, 450.0, 100.0)]);
        let alerts = engine.process_events(Some(&frame), None, t0());
        let zones: Vec<_> = alerts
            .iter()
            .filter_map(|a| match &a.details {
                AlertDetails::Zone { zone, track_id, .. } => Some((zone.as_str(), *track_id)),
                _ => None,
            })
            .collect();
        // Person 2 stands in both; the vault key was already spent by person 1
        assert_eq!(zones, vec![("vault", Some(1)), ("dock", Some(2))]);
    }

    #[test]
    fn test_cooldown_per_track() {
        let engine = AlertEngine::default();
        let fall_a = make_detection("person", Some(1), BoundingBox::new(0.0, 0.0, 200.0, 80.0));
        let fall_b = make_detection("person", Some(2), BoundingBox::new(300.0, 0.0, 500.0, 80.0));

        let first = engine.process_events(Some(&DetectionResult::new(vec![fall_a.clone()])), None, t0());
        assert_eq!(first.len(), 1);

        let later = t0() + Duration::seconds(1);
        let second = engine.process_events(Some(&DetectionResult::new(vec![fall_a, fall_b])), None, later);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].track_id(), Some(2));
    }

    #[test]
    fn test_config_update_applies_next_frame() {
        let engine = AlertEngine::default();
        assert!(engine.process_events(Some(&crowd(2)), None, t0()).is_empty());

        let patch = ConfigPatch {
            max_persons: Some(1),
            ..Default::default()
        };
        engine.update_config(&patch).unwrap();
        let alerts = engine.process_events(Some(&crowd(2)), None, t0());
        assert_eq!(alerts[0].alert_type, AlertType::UnauthorizedPerson);
    }

    #[test]
    fn test_rejected_update_keeps_config() {
        let engine = AlertEngine::default();
        let patch = ConfigPatch {
            crowd_threshold: Some(2),
            cooldown_seconds: Some(-5.0),
            ..Default::default()
        };
        assert!(engine.update_config(&patch).is_err());
        assert_eq!(engine.config(), AlertConfig::default());

        let mut bad = AlertConfig::default();
        bad.restricted_zones = vec![Zone::new("empty", Vec::new())];
        assert!(engine.set_config(bad).is_err());
        assert!(engine.config().restricted_zones.is_empty());
    }

    #[test]
    fn test_reset_clears_tracks_and_cooldowns() {
        let engine = AlertEngine::default();
        assert_eq!(engine.process_events(Some(&crowd(6)), None, t0()).len(), 1);
        assert!(engine.track_count() > 0);

        engine.reset();
        assert_eq!(engine.track_count(), 0);
        assert_eq!(engine.process_events(Some(&crowd(6)), None, t0()).len(), 1);
    }

    #[test]
    fn test_stale_tracks_restart_dwell() {
        let engine = AlertEngine::default();
        engine.process_events(Some(&DetectionResult::new(vec![person_at(7, 10.0, 10.0)])), None, t0());
        assert_eq!(engine.track_count(), 1);
        engine.process_events(Some(&DetectionResult::default()), None, t0() + Duration::seconds(31));
        assert_eq!(engine.track_count(), 0);
    }
}
