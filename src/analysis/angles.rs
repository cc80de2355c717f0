//! Joint angle calculation on the 2D image-plane projection.

use nalgebra::Vector2;
use serde::Serialize;

use super::LandmarkGate;
use crate::pose::{Landmark, LandmarkIndex, PoseResult};

/// Measured angle at one joint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointAngle {
    pub joint: &'static str,
    /// 0–180
    pub degrees: f32,
}

/// (joint name, ray end a, vertex b, ray end c)
pub const JOINT_TABLE: [(&str, LandmarkIndex, LandmarkIndex, LandmarkIndex); 12] = {
    use LandmarkIndex::*;
    [
        ("Left Shoulder", LeftElbow, LeftShoulder, LeftHip),
        ("Right Shoulder", RightElbow, RightShoulder, RightHip),
        ("Left Elbow", LeftShoulder, LeftElbow, LeftWrist),
        ("Right Elbow", RightShoulder, RightElbow, RightWrist),
        ("Left Wrist", LeftElbow, LeftWrist, LeftIndex),
        ("Right Wrist", RightElbow, RightWrist, RightIndex),
        ("Left Hip", LeftShoulder, LeftHip, LeftKnee),
        ("Right Hip", RightShoulder, RightHip, RightKnee),
        ("Left Knee", LeftHip, LeftKnee, LeftAnkle),
        ("Right Knee", RightHip, RightKnee, RightAnkle),
        ("Left Ankle", LeftKnee, LeftAnkle, LeftFootIndex),
        ("Right Ankle", RightKnee, RightAnkle, RightFootIndex),
    ]
};

/// Angle at `b` between rays b→a and b→c, in degrees.
///
/// Difference of the two ray headings, folded into 0–180 (`360 - θ` above 180).
pub fn angle_at(a: &Landmark, b: &Landmark, c: &Landmark) -> f32 {
    let ba = Vector2::new(a.x - b.x, a.y - b.y);
    let bc = Vector2::new(c.x - b.x, c.y - b.y);

    let radians = bc.y.atan2(bc.x) - ba.y.atan2(ba.x);
    let mut degrees = radians.to_degrees().abs();
    if degrees > 180.0 {
        degrees = 360.0 - degrees;
    }
    degrees.clamp(0.0, 180.0)
}

/// Angles for every joint in [`JOINT_TABLE`] whose three landmarks pass the gate.
pub fn joint_angles(pose: &PoseResult, gate: LandmarkGate) -> Vec<JointAngle> {
    JOINT_TABLE
        .iter()
        .filter_map(|&(joint, a, b, c)| {
            let a = gate.get(pose, a)?;
            let b = gate.get(pose, b)?;
            let c = gate.get(pose, c)?;
            let degrees = angle_at(a, b, c);
            degrees.is_finite().then_some(JointAngle { joint, degrees })
        })
        .collect()
}

/// Torso centroid: mean of both shoulders and both hips.
pub fn center_of_mass(pose: &PoseResult, gate: LandmarkGate) -> Option<Landmark> {
    use LandmarkIndex::*;
    let torso = [LeftShoulder, RightShoulder, LeftHip, RightHip]
        .iter()
        .map(|&i| gate.get(pose, i))
        .collect::<Option<Vec<_>>>()?;

    let n = torso.len() as f32;
    let x = torso.iter().map(|l| l.x).sum::<f32>() / n;
    let y = torso.iter().map(|l| l.y).sum::<f32>() / n;
    let z = if torso.iter().all(|l| l.z.is_some()) {
        Some(torso.iter().filter_map(|l| l.z).sum::<f32>() / n)
    } else {
        None
    };
    Some(Landmark { x, y, z, visibility: None })
}
