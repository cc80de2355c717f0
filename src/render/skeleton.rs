use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::analysis::LandmarkGate;
use crate::pose::{LandmarkIndex, PoseResult, Side};

/// Bone list of the 33-point topology (start, end)
pub const SKELETON_CONNECTIONS: [(LandmarkIndex, LandmarkIndex); 35] = {
    use LandmarkIndex::*;
    [
        // face
        (Nose, LeftEyeInner),
        (LeftEyeInner, LeftEye),
        (LeftEye, LeftEyeOuter),
        (LeftEyeOuter, LeftEar),
        (Nose, RightEyeInner),
        (RightEyeInner, RightEye),
        (RightEye, RightEyeOuter),
        (RightEyeOuter, RightEar),
        (MouthLeft, MouthRight),
        // arms and hands
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftPinky),
        (LeftWrist, LeftIndex),
        (LeftWrist, LeftThumb),
        (LeftPinky, LeftIndex),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightPinky),
        (RightWrist, RightIndex),
        (RightWrist, RightThumb),
        (RightPinky, RightIndex),
        // torso
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        // legs and feet
        (LeftHip, LeftKnee),
        (RightHip, RightKnee),
        (LeftKnee, LeftAnkle),
        (RightKnee, RightAnkle),
        (LeftAnkle, LeftHeel),
        (RightAnkle, RightHeel),
        (LeftHeel, LeftFootIndex),
        (RightHeel, RightFootIndex),
        (LeftAnkle, LeftFootIndex),
        (RightAnkle, RightFootIndex),
    ]
};

pub const LEFT_COLOR: Rgb<u8> = Rgb([255, 138, 0]);
pub const RIGHT_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
pub const CENTER_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub const JOINT_RADIUS: i32 = 4;

pub fn side_color(side: Side) -> Rgb<u8> {
    match side {
        Side::Left => LEFT_COLOR,
        Side::Right => RIGHT_COLOR,
        Side::Center => CENTER_COLOR,
    }
}

/// Bones joining two landmarks of the same side take that side's colour.
pub fn bone_color(start: LandmarkIndex, end: LandmarkIndex) -> Rgb<u8> {
    match (start.side(), end.side()) {
        (a, b) if a == b => side_color(a),
        _ => CENTER_COLOR,
    }
}

/// Draws bones then joints for every landmark the gate admits.
pub fn draw_skeleton(image: &mut RgbImage, pose: &PoseResult, gate: LandmarkGate) {
    let (w, h) = image.dimensions();

    for &(start, end) in SKELETON_CONNECTIONS.iter() {
        let (Some(a), Some(b)) = (gate.get(pose, start), gate.get(pose, end)) else {
            continue;
        };
        let (x1, y1) = a.to_pixel(w, h);
        let (x2, y2) = b.to_pixel(w, h);
        draw_line_segment_mut(
            image,
            (x1 as f32, y1 as f32),
            (x2 as f32, y2 as f32),
            bone_color(start, end),
        );
    }

    for index in LandmarkIndex::ALL {
        if let Some(l) = gate.get(pose, index) {
            draw_filled_circle_mut(image, l.to_pixel(w, h), JOINT_RADIUS, side_color(index.side()));
        }
    }
}
