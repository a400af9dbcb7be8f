use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::alerts::dispatcher::{DispatchReport, Dispatcher, NotifyReport};
use super::alerts::engine::AlertEngine;
use super::alerts::model::AlertEvent;
use super::alerts::notifier::Notifier;
use super::config::Settings;
use super::gesture::GestureStabilizer;
use super::model::{FrameRecord, GestureKind, GestureObservation};

/// Snapshot published after each frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStats {
    pub person_count: usize,
    pub total_detections: usize,
    pub active_alerts: usize,
    pub gesture_detected: Option<GestureKind>,
    pub timestamp: DateTime<Utc>,
}

pub struct CoordinatorOutput {
    pub alerts: Vec<AlertEvent>,
    pub stats: FrameStats,
    pub report: DispatchReport,
}

/// Runs the whole per-frame path: gesture smoothing, rule evaluation,
/// dispatch and stats.
pub struct Coordinator {
    engine: Arc<AlertEngine>,
    dispatcher: Arc<Dispatcher>,
    stabilizer: Mutex<GestureStabilizer>,
    recent_window: Duration,
}

impl Coordinator {
    pub fn new(engine: Arc<AlertEngine>, dispatcher: Arc<Dispatcher>, recent_window: Duration) -> Self {
        Self {
            engine,
            dispatcher,
            stabilizer: Mutex::new(GestureStabilizer::new()),
            recent_window,
        }
    }

    pub fn from_settings(settings: &Settings, notifier: Arc<dyn Notifier>) -> Self {
        let engine = Arc::new(AlertEngine::new(settings.alert.clone()));
        let dispatcher = Arc::new(Dispatcher::new(notifier, settings.alert.notify_timeout()));
        Self::new(
            engine,
            dispatcher,
            Duration::from_secs(settings.recent_window_seconds),
        )
    }

    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn resolve_gesture(&self, frame: &FrameRecord) -> Option<GestureObservation> {
        if frame.gesture.is_some() {
            return frame.gesture;
        }
        let raw = frame.raw_gesture?;
        let mut stabilizer = self.stabilizer.lock().unwrap_or_else(PoisonError::into_inner);
        Some(stabilizer.observe(raw, frame.hand_count.unwrap_or(0)))
    }

    /// Evaluate and dispatch one frame. Notification runs in the background
    /// on the current tokio runtime, so this never waits on the notifier.
    pub fn tick(&self, frame: &FrameRecord) -> CoordinatorOutput {
        let now = frame.timestamp;
        let detections = frame.detection_result();
        let gesture = self.resolve_gesture(frame);

        let alerts = self
            .engine
            .process_events(detections.as_ref(), gesture.as_ref(), now);
        let report = self.dispatcher.trigger(alerts.clone());

        let stats = FrameStats {
            person_count: detections.as_ref().map_or(0, |d| d.person_count()),
            total_detections: detections.as_ref().map_or(0, |d| d.detections.len()),
            active_alerts: self.dispatcher.active_count(now, self.recent_window),
            gesture_detected: gesture.and_then(|g| g.stable_gesture),
            timestamp: now,
        };

        CoordinatorOutput {
            alerts,
            stats,
            report,
        }
    }

    /// Alerts dispatched no longer than `max_age` before `now`, oldest first.
    pub fn recent_alerts(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<AlertEvent> {
        self.dispatcher.recent(now, max_age)
    }

    /// Wait for outstanding notifications, e.g. before shutting down.
    pub async fn flush(&self) -> NotifyReport {
        self.dispatcher.flush().await
    }

    pub fn reset(&self) {
        self.engine.reset();
        self.dispatcher.clear();
        self.stabilizer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}
