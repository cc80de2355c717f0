//! Ball detection scoring and tracking.
//!
//! Detection itself is an external capability ([`ObjectDetector`]). Choosing the tracked
//! object among raw detections is a pure function of the detections, the optional pose
//! of the same frame, and [`ObjectScoring`].

use async_trait::async_trait;
use image::RgbImage;
use serde::Serialize;

use super::landmark::{LandmarkIndex, PoseResult};
use crate::analysis::LandmarkGate;
use crate::config::ObjectConfig;
use crate::error::Result;

/// Axis-aligned box in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Raw detector output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDetection {
    pub bbox: BBox,
    pub confidence: f32,
    pub label: String,
}

#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect_objects(&self, frame: &RgbImage) -> Result<Vec<ObjectDetection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Near a hand or foot.
    Valid,
    /// Far from every limb but confidently detected: provisionally a ball in the air.
    InFlight,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectCandidate {
    pub detection: ObjectDetection,
    pub score: f32,
    /// Normalized distance to the nearest wrist/knee/ankle
    pub limb_distance: Option<f32>,
    pub status: ObjectStatus,
}

/// Weights and thresholds for candidate selection.
#[derive(Debug, Clone)]
pub struct ObjectScoring {
    pub min_score: f32,
    pub confidence_weight: f32,
    pub label_weight: f32,
    pub proximity_weight: f32,
    pub base_reach: f32,
    pub reach_per_second: f32,
    pub in_flight_confidence: f32,
    pub static_travel_px: f32,
    /// Which limb landmarks count when measuring proximity.
    pub gate: LandmarkGate,
}

impl From<&ObjectConfig> for ObjectScoring {
    fn from(c: &ObjectConfig) -> Self {
        Self {
            min_score: c.min_score,
            confidence_weight: c.confidence_weight,
            label_weight: c.label_weight,
            proximity_weight: c.proximity_weight,
            base_reach: c.base_reach,
            reach_per_second: c.reach_per_second,
            in_flight_confidence: c.in_flight_confidence,
            static_travel_px: c.static_travel_px,
            gate: LandmarkGate::default(),
        }
    }
}

impl ObjectScoring {
    pub fn with_gate(mut self, gate: LandmarkGate) -> Self {
        self.gate = gate;
        self
    }
}

impl Default for ObjectScoring {
    fn default() -> Self {
        Self::from(&ObjectConfig::default())
    }
}

const LIMBS: [LandmarkIndex; 6] = [
    LandmarkIndex::LeftWrist,
    LandmarkIndex::RightWrist,
    LandmarkIndex::LeftKnee,
    LandmarkIndex::RightKnee,
    LandmarkIndex::LeftAnkle,
    LandmarkIndex::RightAnkle,
];

/// How well a detector label matches "ball".
pub fn label_quality(label: &str) -> f32 {
    let label = label.to_ascii_lowercase();
    if label == "sports ball" || label.contains("ball") {
        1.0
    } else if matches!(label.as_str(), "orange" | "apple" | "frisbee" | "clock") {
        // round objects a detector commonly confuses with a ball
        0.5
    } else {
        0.0
    }
}

/// Normalized distance from the box centre to the nearest usable limb landmark.
pub fn limb_distance(
    bbox: &BBox,
    pose: &PoseResult,
    gate: LandmarkGate,
    frame_width: u32,
    frame_height: u32,
) -> Option<f32> {
    let (cx, cy) = bbox.center();
    let cx = cx / frame_width.max(1) as f32;
    let cy = cy / frame_height.max(1) as f32;
    LIMBS
        .iter()
        .filter_map(|&i| gate.get(pose, i))
        .map(|l| ((l.x - cx).powi(2) + (l.y - cy).powi(2)).sqrt())
        .min_by(|a, b| a.total_cmp(b))
}

/// `confidence_weight·confidence + label_weight·label + proximity_weight·proximity`.
pub fn score_candidate(detection: &ObjectDetection, limb_distance: Option<f32>, scoring: &ObjectScoring) -> f32 {
    let proximity = limb_distance.map(|d| (1.0 - d).clamp(0.0, 1.0)).unwrap_or(0.0);
    scoring.confidence_weight * detection.confidence
        + scoring.label_weight * label_quality(&detection.label)
        + scoring.proximity_weight * proximity
}

/// Picks the best-scoring detection and classifies it.
///
/// `seconds_since_valid` widens the reach: the longer the object has been out of hand,
/// the further from the body it may legitimately be.
pub fn select_object(
    detections: &[ObjectDetection],
    pose_hint: Option<&PoseResult>,
    frame_width: u32,
    frame_height: u32,
    seconds_since_valid: Option<f64>,
    scoring: &ObjectScoring,
) -> Option<ObjectCandidate> {
    let best = detections
        .iter()
        .filter(|d| d.confidence >= scoring.min_score)
        .map(|d| {
            let distance = pose_hint.and_then(|p| limb_distance(&d.bbox, p, scoring.gate, frame_width, frame_height));
            (d, distance, score_candidate(d, distance, scoring))
        })
        .max_by(|a, b| a.2.total_cmp(&b.2))?;

    let (detection, limb_distance, score) = best;
    let reach = scoring.base_reach + scoring.reach_per_second * seconds_since_valid.unwrap_or(0.0) as f32;
    let status = match limb_distance {
        None => ObjectStatus::Valid,
        Some(d) if d <= reach => ObjectStatus::Valid,
        Some(_) if detection.confidence >= scoring.in_flight_confidence => ObjectStatus::InFlight,
        Some(_) => ObjectStatus::Invalid,
    };

    Some(ObjectCandidate {
        detection: detection.clone(),
        score,
        limb_distance,
        status,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedObject {
    pub timestamp: f64,
    pub candidate: Option<ObjectCandidate>,
}

/// Invalidates the whole track when the box centre's total travel over all usable
/// sightings stays under `min_travel_px`. Returns whether the track was invalidated.
pub fn filter_static(track: &mut [TrackedObject], min_travel_px: f32) -> bool {
    let centers: Vec<(f32, f32)> = track
        .iter()
        .filter_map(|t| t.candidate.as_ref())
        .filter(|c| c.status != ObjectStatus::Invalid)
        .map(|c| c.detection.bbox.center())
        .collect();
    if centers.len() < 2 {
        return false;
    }

    let travel: f32 = centers
        .windows(2)
        .map(|w| ((w[1].0 - w[0].0).powi(2) + (w[1].1 - w[0].1).powi(2)).sqrt())
        .sum();
    if travel >= min_travel_px {
        return false;
    }

    for candidate in track.iter_mut().filter_map(|t| t.candidate.as_mut()) {
        candidate.status = ObjectStatus::Invalid;
    }
    true
}

/// Accumulates per-frame object choices across one captured sequence.
pub struct ObjectTracker {
    scoring: ObjectScoring,
    last_valid: Option<f64>,
    track: Vec<TrackedObject>,
}

impl ObjectTracker {
    pub fn new(scoring: ObjectScoring) -> Self {
        Self {
            scoring,
            last_valid: None,
            track: Vec::new(),
        }
    }

    pub fn observe(
        &mut self,
        timestamp: f64,
        detections: &[ObjectDetection],
        pose_hint: Option<&PoseResult>,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<&ObjectCandidate> {
        let since = self.last_valid.map(|t| (timestamp - t).abs());
        let candidate = select_object(detections, pose_hint, frame_width, frame_height, since, &self.scoring);
        if candidate.as_ref().is_some_and(|c| c.status == ObjectStatus::Valid) {
            self.last_valid = Some(timestamp);
        }
        self.track.push(TrackedObject { timestamp, candidate });
        self.track.last().and_then(|t| t.candidate.as_ref())
    }

    /// Returns the track after static-clutter filtering.
    pub fn finish(mut self) -> Vec<TrackedObject> {
        if filter_static(&mut self.track, self.scoring.static_travel_px) {
            tracing::debug!("object track discarded as static clutter");
        }
        self.track
    }
}
