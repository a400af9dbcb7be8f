use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TrackId = i64;

/// Class label the upstream detector assigns to people (COCO class 0).
pub const PERSON_CLASS: &str = "person";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned box in image coordinates, (x1, y1) top-left and (x2, y2) bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Width over height, or `None` when the box has no height.
    pub fn aspect_ratio(&self) -> Option<f64> {
        let height = self.height();
        if height <= 0.0 {
            return None;
        }
        Some(self.width() / height)
    }

    fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

/// One perceived object in one frame, as produced by the upstream detector/tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_name: String,
    pub track_id: Option<TrackId>,
    pub center: Point,
    pub area: f64,
    pub timestamp: DateTime<Utc>,
}

impl Detection {
    pub fn is_person(&self) -> bool {
        self.class_name == PERSON_CLASS
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DetectionError {
    #[error("detection is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("detection field `{0}` is not a finite number")]
    NonFinite(&'static str),
}

/// Detection as it arrives on the wire. Every field is optional so that one
/// malformed record can be rejected without failing the whole frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: Option<[f64; 4]>,
    pub confidence: Option<f32>,
    pub class_name: Option<String>,
    pub track_id: Option<TrackId>,
    pub center: Option<[f64; 2]>,
    pub area: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawDetection {
    /// Validate and convert. `center` and `area` are derived from the box when
    /// absent; a missing timestamp falls back to the frame's.
    pub fn into_detection(self, frame_time: DateTime<Utc>) -> Result<Detection, DetectionError> {
        let [x1, y1, x2, y2] = self.bbox.ok_or(DetectionError::MissingField("bbox"))?;
        let bbox = BoundingBox::new(x1, y1, x2, y2);
        if !bbox.is_finite() {
            return Err(DetectionError::NonFinite("bbox"));
        }
        let confidence = self
            .confidence
            .ok_or(DetectionError::MissingField("confidence"))?;
        if !confidence.is_finite() {
            return Err(DetectionError::NonFinite("confidence"));
        }
        let class_name = self
            .class_name
            .filter(|name| !name.is_empty())
            .ok_or(DetectionError::MissingField("class_name"))?;

        let center = self
            .center
            .map(|[x, y]| Point::new(x, y))
            .unwrap_or_else(|| bbox.center());
        if !center.is_finite() {
            return Err(DetectionError::NonFinite("center"));
        }
        let area = self.area.unwrap_or_else(|| bbox.area());
        if !area.is_finite() {
            return Err(DetectionError::NonFinite("area"));
        }

        Ok(Detection {
            bbox,
            confidence,
            class_name,
            track_id: self.track_id,
            center,
            area,
            timestamp: self.timestamp.unwrap_or(frame_time),
        })
    }
}

/// Detector output for one frame. `skipped` is set when the upstream stage
/// dropped the frame (frame skipping, motion filter).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub skipped: bool,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            skipped: false,
        }
    }

    pub fn skipped() -> Self {
        Self {
            detections: Vec::new(),
            skipped: true,
        }
    }

    /// Convert wire records, dropping (and logging) the malformed ones.
    pub fn from_raw(raw: Vec<RawDetection>, frame_time: DateTime<Utc>) -> Self {
        let mut detections = Vec::with_capacity(raw.len());
        for (index, record) in raw.into_iter().enumerate() {
            match record.into_detection(frame_time) {
                Ok(detection) => detections.push(detection),
                Err(e) => log::warn!("Skipping detection #{} at {}: {}", index, frame_time, e),
            }
        }
        Self::new(detections)
    }

    pub fn persons(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.is_person())
    }

    pub fn person_count(&self) -> usize {
        self.persons().count()
    }
}

/// Gestures that are stable enough to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GestureKind {
    Sos,
    Help,
    Stop,
}

/// Per-frame label from the hand classifier, before stabilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RawGesture {
    Sos,
    Help,
    Stop,
    Waving,
    Pointing,
    #[serde(rename = "NONE")]
    Unrecognized,
}

impl RawGesture {
    pub fn actionable(&self) -> Option<GestureKind> {
        match self {
            Self::Sos => Some(GestureKind::Sos),
            Self::Help => Some(GestureKind::Help),
            Self::Stop => Some(GestureKind::Stop),
            Self::Waving | Self::Pointing | Self::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GestureObservation {
    pub stable_gesture: Option<GestureKind>,
    #[serde(default)]
    pub hand_count: u32,
}

/// One line of a recorded perception log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp: DateTime<Utc>,
    /// `None` means the detector produced no result for this frame.
    #[serde(default)]
    pub detections: Option<Vec<RawDetection>>,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub gesture: Option<GestureObservation>,
    /// Unstabilized classifier label; used when `gesture` is absent.
    #[serde(default)]
    pub raw_gesture: Option<RawGesture>,
    #[serde(default)]
    pub hand_count: Option<u32>,
}

impl FrameRecord {
    pub fn detection_result(&self) -> Option<DetectionResult> {
        if self.skipped {
            return Some(DetectionResult::skipped());
        }
        self.detections
            .clone()
            .map(|raw| DetectionResult::from_raw(raw, self.timestamp))
    }
}
