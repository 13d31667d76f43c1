use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a fiducial (ArUco) marker as encoded in its printed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub u32);

impl MarkerId {
    /// Create a new `MarkerId` from a raw id value.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the raw id value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 2-D image-plane position of a detected marker's centroid, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A single marker sighting within one frame.
///
/// Ephemeral — produced by the frame source once per visible marker per
/// frame and consumed by the stability tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerObservation {
    pub id: MarkerId,
    pub centroid: Point,
}

impl MarkerObservation {
    pub fn new(id: MarkerId, centroid: Point) -> Self {
        Self { id, centroid }
    }
}

/// Immutable record of a marker trigger, produced at most once per episode.
///
/// `timestamp` is unix seconds — the wire contract expects a float, so
/// wall-clock time is captured at emission rather than the monotonic
/// instants used for tracking math.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerEvent {
    pub marker_id: MarkerId,
    pub payload: serde_json::Value,
    pub timestamp: f64,
}

impl TriggerEvent {
    /// Build a trigger event stamped with the current wall-clock time.
    pub fn now(marker_id: MarkerId, payload: serde_json::Value) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            marker_id,
            payload,
            timestamp,
        }
    }
}
