//! Biomechanics derived from a single pose: joint angles, centre of mass, symmetry.
//!
//! Pure functions only. Every function takes the same [`LandmarkGate`] so angles,
//! symmetry and telemetry agree on which landmarks are usable.

pub mod angles;
pub mod symmetry;

use serde::Deserialize;

use crate::pose::{Landmark, LandmarkIndex, PoseResult};

pub use angles::{angle_at, center_of_mass, joint_angles, JointAngle, JOINT_TABLE};
pub use symmetry::{analyze_symmetry, SymmetryAssessment};

/// Which landmarks count as usable.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkGate {
    /// The slot exists and has finite coordinates.
    #[default]
    Presence,
    /// As `Presence`, and visibility is strictly above the threshold.
    Visibility(f32),
}

impl LandmarkGate {
    pub fn admits(&self, landmark: &Landmark) -> bool {
        if !landmark.is_finite() {
            return false;
        }
        match *self {
            LandmarkGate::Presence => true,
            LandmarkGate::Visibility(min) => landmark.visibility_or_one() > min,
        }
    }

    pub fn get<'a>(&self, pose: &'a PoseResult, index: LandmarkIndex) -> Option<&'a Landmark> {
        pose.get(index).filter(|l| self.admits(l))
    }
}
