// Rule evaluators.
//
// Each evaluator looks at one frame's inputs (plus track history) and returns
// at most one alert candidate. None of them mutate state or notify anyone;
// the engine records positions beforehand and gates the candidates afterwards.

use chrono::{DateTime, Utc};

use super::model::{AlertDetails, AlertEvent, AlertType};
use crate::core::config::AlertConfig;
use crate::core::model::{Detection, GestureKind, GestureObservation};
use crate::core::tracker::TrackStore;
use crate::core::zones::Zone;

/// Number of consecutive position pairs averaged for movement speed.
const SPEED_PAIRS: usize = 3;

/// Inputs shared by every evaluator for one frame.
pub struct TriggerContext<'a> {
    pub config: &'a AlertConfig,
    pub tracks: &'a TrackStore,
    pub now: DateTime<Utc>,
}

/// SOS and HELP raise alerts; STOP and no gesture do not.
pub fn evaluate_gesture(gesture: &GestureObservation, now: DateTime<Utc>) -> Option<AlertEvent> {
    let kind = gesture.stable_gesture?;
    let (alert_type, description) = match kind {
        GestureKind::Sos => (AlertType::SosGesture, "SOS gesture detected - emergency signal"),
        GestureKind::Help => (AlertType::HelpGesture, "HELP gesture detected - assistance requested"),
        GestureKind::Stop => return None,
    };
    Some(AlertEvent::new(
        alert_type,
        description,
        now,
        AlertDetails::Gesture {
            gesture: kind,
            hand_count: gesture.hand_count,
        },
    ))
}

/// Crowd takes precedence over the occupancy limit; at most one fires.
pub fn evaluate_occupancy(person_count: usize, ctx: &TriggerContext) -> Option<AlertEvent> {
    let config = ctx.config;
    let (alert_type, description) = if person_count > config.crowd_threshold {
        (
            AlertType::CrowdDetected,
            format!("Crowd detected: {} persons (threshold {})", person_count, config.crowd_threshold),
        )
    } else if person_count > config.max_persons {
        (
            AlertType::UnauthorizedPerson,
            format!("{} persons present, {} allowed", person_count, config.max_persons),
        )
    } else {
        return None;
    };
    Some(AlertEvent::new(
        alert_type,
        description,
        ctx.now,
        AlertDetails::Occupancy {
            count: person_count,
        },
    ))
}

/// A track present past the loitering time whose whole recorded path fits
/// inside a `loitering_distance` square.
pub fn evaluate_loitering(detection: &Detection, ctx: &TriggerContext) -> Option<AlertEvent> {
    let track_id = detection.track_id?;
    let record = ctx.tracks.get(track_id)?;
    let config = ctx.config;

    let dwell = record.dwell(ctx.now);
    if dwell < config.loitering_duration() {
        return None;
    }
    if record.len() < config.loitering_min_samples {
        return None;
    }

    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for sample in record.history() {
        min_x = min_x.min(sample.point.x);
        max_x = max_x.max(sample.point.x);
        min_y = min_y.min(sample.point.y);
        max_y = max_y.max(sample.point.y);
    }
    let extent = (max_x - min_x).max(max_y - min_y);
    if extent >= config.loitering_distance {
        return None;
    }

    let duration = dwell.as_secs_f64();
    Some(AlertEvent::new(
        AlertType::Loitering,
        format!("Person (track {}) loitering for {:.0}s", track_id, duration),
        ctx.now,
        AlertDetails::Loitering {
            track_id,
            duration,
            position: detection.center,
        },
    ))
}

/// Mean displacement over the last few consecutive samples above the
/// configured speed. Needs at least three samples.
pub fn evaluate_suspicious_movement(detection: &Detection, ctx: &TriggerContext) -> Option<AlertEvent> {
    let track_id = detection.track_id?;
    let history = ctx.tracks.get(track_id)?.history();
    if history.len() < 3 {
        return None;
    }

    let tail: Vec<_> = history
        .iter()
        .skip(history.len().saturating_sub(SPEED_PAIRS + 1))
        .map(|sample| sample.point)
        .collect();
    let distances: Vec<f64> = tail.windows(2).map(|pair| pair[0].distance(&pair[1])).collect();
    let speed = distances.iter().sum::<f64>() / distances.len() as f64;

    if speed <= ctx.config.suspicious_speed {
        return None;
    }
    Some(AlertEvent::new(
        AlertType::SuspiciousBehavior,
        format!("Rapid movement by track {}: {:.1} units/frame", track_id, speed),
        ctx.now,
        AlertDetails::Movement { track_id, speed },
    ))
}

/// A person box wider than tall by more than the configured ratio.
/// Boxes without height are skipped.
pub fn evaluate_fall(detection: &Detection, ctx: &TriggerContext) -> Option<AlertEvent> {
    let aspect_ratio = detection.bbox.aspect_ratio()?;
    if aspect_ratio <= ctx.config.fall_aspect_ratio {
        return None;
    }
    let who = match detection.track_id {
        Some(track_id) => format!("track {}", track_id),
        None => "untracked person".to_string(),
    };
    Some(AlertEvent::new(
        AlertType::FallDetected,
        format!("Possible fall: {} (aspect ratio {:.2})", who, aspect_ratio),
        ctx.now,
        AlertDetails::Fall {
            track_id: detection.track_id,
            position: detection.center,
            aspect_ratio,
        },
    ))
}

pub fn evaluate_restricted_zone(detection: &Detection, zone: &Zone, ctx: &TriggerContext) -> Option<AlertEvent> {
    if !zone.contains(&detection.center) {
        return None;
    }
    Some(AlertEvent::new(
        AlertType::RestrictedZone,
        format!("Person in restricted zone '{}'", zone.name),
        ctx.now,
        AlertDetails::Zone {
            zone: zone.name.clone(),
            track_id: detection.track_id,
            position: detection.center,
        },
    ))
}
