use serde::Serialize;

use super::LandmarkGate;
use crate::pose::{LandmarkIndex, PoseResult};

/// Left/right levelness of the shoulder and hip lines.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SymmetryAssessment {
    pub shoulders_level: bool,
    pub hips_level: bool,
    /// |left.y - right.y| in normalized image height; `None` if either side is unusable
    pub shoulder_tilt: Option<f32>,
    pub hip_tilt: Option<f32>,
}

impl SymmetryAssessment {
    pub fn is_empty(&self) -> bool {
        self.shoulder_tilt.is_none() && self.hip_tilt.is_none()
    }
}

fn tilt(pose: &PoseResult, gate: LandmarkGate, left: LandmarkIndex, right: LandmarkIndex) -> Option<f32> {
    let l = gate.get(pose, left)?;
    let r = gate.get(pose, right)?;
    Some((l.y - r.y).abs())
}

/// A pair is level when its vertical deviation is below `threshold`.
/// An unusable pair is reported as not level.
pub fn analyze_symmetry(pose: &PoseResult, gate: LandmarkGate, threshold: f32) -> SymmetryAssessment {
    let shoulder_tilt = tilt(pose, gate, LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
    let hip_tilt = tilt(pose, gate, LandmarkIndex::LeftHip, LandmarkIndex::RightHip);

    SymmetryAssessment {
        shoulders_level: shoulder_tilt.is_some_and(|t| t < threshold),
        hips_level: hip_tilt.is_some_and(|t| t < threshold),
        shoulder_tilt,
        hip_tilt,
    }
}
