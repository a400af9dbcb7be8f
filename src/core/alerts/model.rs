// Alert model types: alert families, severity, typed metadata and dedup keys.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::model::{GestureKind, Point, TrackId};

/// Alert families produced by the rule evaluators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// Distress hand signal held steadily
    SosGesture,
    /// Help hand signal held steadily
    HelpGesture,
    /// Person count above the crowd threshold
    CrowdDetected,
    /// Person count above the allowed occupancy, below crowd level
    UnauthorizedPerson,
    /// Track present for a long time without moving far
    Loitering,
    /// Track moving unusually fast between frames
    SuspiciousBehavior,
    /// Person silhouette wider than tall
    FallDetected,
    /// Person inside a configured polygon
    RestrictedZone,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SosGesture => "SOS_GESTURE",
            Self::HelpGesture => "HELP_GESTURE",
            Self::CrowdDetected => "CROWD_DETECTED",
            Self::UnauthorizedPerson => "UNAUTHORIZED_PERSON",
            Self::Loitering => "LOITERING",
            Self::SuspiciousBehavior => "SUSPICIOUS_BEHAVIOR",
            Self::FallDetected => "FALL_DETECTED",
            Self::RestrictedZone => "RESTRICTED_ZONE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SosGesture => "SOS Gesture",
            Self::HelpGesture => "Help Gesture",
            Self::CrowdDetected => "Crowd Detected",
            Self::UnauthorizedPerson => "Unauthorized Person",
            Self::Loitering => "Loitering",
            Self::SuspiciousBehavior => "Suspicious Behavior",
            Self::FallDetected => "Fall Detected",
            Self::RestrictedZone => "Restricted Zone",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SosGesture | Self::FallDetected => Severity::CRITICAL,
            Self::HelpGesture | Self::CrowdDetected | Self::RestrictedZone => Severity::HIGH,
            Self::UnauthorizedPerson | Self::Loitering | Self::SuspiciousBehavior => {
                Severity::MEDIUM
            }
        }
    }

}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, 1 (informational) to 5 (critical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Severity(u8);

impl Severity {
    pub const INFO: Severity = Severity(1);
    pub const LOW: Severity = Severity(2);
    pub const MEDIUM: Severity = Severity(3);
    pub const HIGH: Severity = Severity(4);
    pub const CRITICAL: Severity = Severity(5);

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-family alert payload. Serialized untagged so the wire form is a flat
/// `metadata` object whose keys depend on the alert type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AlertDetails {
    Gesture {
        gesture: GestureKind,
        hand_count: u32,
    },
    Occupancy {
        count: usize,
    },
    Loitering {
        track_id: TrackId,
        /// Seconds since the track was first seen
        duration: f64,
        position: Point,
    },
    Movement {
        track_id: TrackId,
        /// Mean displacement per frame over the recent samples
        speed: f64,
    },
    Fall {
        track_id: Option<TrackId>,
        position: Point,
        aspect_ratio: f64,
    },
    Zone {
        zone: String,
        track_id: Option<TrackId>,
        position: Point,
    },
}

/// Scope at which the cooldown gate deduplicates alerts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKey {
    /// Frame-global alerts (crowd, occupancy, gestures)
    Global(AlertType),
    /// One entry per track; untracked detections share `None`
    Track(AlertType, Option<TrackId>),
    Zone(AlertType, String),
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global(alert_type) => write!(f, "{}", alert_type),
            Self::Track(alert_type, Some(track_id)) => write!(f, "{}:{}", alert_type, track_id),
            Self::Track(alert_type, None) => write!(f, "{}:untracked", alert_type),
            Self::Zone(alert_type, zone) => write!(f, "{}:{}", alert_type, zone),
        }
    }
}

/// An alert that passed (or is about to pass) the cooldown gate.
///
/// Serializes as `{type, severity, description, timestamp, metadata}` with an
/// RFC 3339 timestamp, which is what API consumers receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "metadata")]
    pub details: AlertDetails,
}

impl AlertEvent {
    pub fn new(
        alert_type: AlertType,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
        details: AlertDetails,
    ) -> Self {
        Self {
            alert_type,
            severity: alert_type.severity(),
            description: description.into(),
            timestamp,
            details,
        }
    }

    /// Dedup key: plain type for frame-global alerts, type + track id for
    /// per-entity alerts, type + zone name for zone alerts.
    pub fn key(&self) -> AlertKey {
        match &self.details {
            AlertDetails::Gesture { .. } | AlertDetails::Occupancy { .. } => {
                AlertKey::Global(self.alert_type)
            }
            AlertDetails::Loitering { track_id, .. } | AlertDetails::Movement { track_id, .. } => {
                AlertKey::Track(self.alert_type, Some(*track_id))
            }
            AlertDetails::Fall { track_id, .. } => AlertKey::Track(self.alert_type, *track_id),
            AlertDetails::Zone { zone, .. } => AlertKey::Zone(self.alert_type, zone.clone()),
        }
    }

    pub fn track_id(&self) -> Option<TrackId> {
        match &self.details {
            AlertDetails::Loitering { track_id, .. } | AlertDetails::Movement { track_id, .. } => {
                Some(*track_id)
            }
            AlertDetails::Fall { track_id, .. } | AlertDetails::Zone { track_id, .. } => *track_id,
            AlertDetails::Gesture { .. } | AlertDetails::Occupancy { .. } => None,
        }
    }
}
