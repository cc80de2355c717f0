use serde::{Deserialize, Serialize};

/// 33-point body topology. The discriminant is the landmark's slot in a [`PoseResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    pub const ALL: [LandmarkIndex; Self::COUNT] = {
        use LandmarkIndex::*;
        [
            Nose, LeftEyeInner, LeftEye, LeftEyeOuter, RightEyeInner, RightEye, RightEyeOuter,
            LeftEar, RightEar, MouthLeft, MouthRight, LeftShoulder, RightShoulder, LeftElbow,
            RightElbow, LeftWrist, RightWrist, LeftPinky, RightPinky, LeftIndex, RightIndex,
            LeftThumb, RightThumb, LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle,
            RightAnkle, LeftHeel, RightHeel, LeftFootIndex, RightFootIndex,
        ]
    };

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// From the ears down, odd slots are the body's left and even slots its right.
    /// The eye landmarks are grouped in triples instead.
    pub fn side(self) -> Side {
        match self as usize {
            0 => Side::Center,
            1..=3 => Side::Left,
            4..=6 => Side::Right,
            i if i % 2 == 1 => Side::Left,
            _ => Side::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    Center,
}

/// Single landmark in normalized image space (world variant: metres, hip-centred).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    /// Detection confidence (0.0–1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None, visibility: None }
    }

    pub fn with_visibility(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, z: None, visibility: Some(visibility) }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Missing visibility counts as fully visible.
    pub fn visibility_or_one(&self) -> f32 {
        self.visibility.unwrap_or(1.0)
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// One detected body. Both landmark lists always hold [`LandmarkIndex::COUNT`] slots;
/// `None` marks a landmark the detector did not report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseResult {
    pub landmarks: Vec<Option<Landmark>>,
    #[serde(default)]
    pub world_landmarks: Vec<Option<Landmark>>,
}

impl PoseResult {
    /// Pads or truncates both lists to the fixed topology size.
    pub fn new(mut landmarks: Vec<Option<Landmark>>, mut world_landmarks: Vec<Option<Landmark>>) -> Self {
        landmarks.resize(LandmarkIndex::COUNT, None);
        world_landmarks.resize(LandmarkIndex::COUNT, None);
        Self { landmarks, world_landmarks }
    }

    pub fn from_landmarks(landmarks: Vec<Option<Landmark>>) -> Self {
        Self::new(landmarks, Vec::new())
    }

    pub fn get(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.landmarks.get(index as usize).and_then(|l| l.as_ref())
    }

    pub fn world(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.world_landmarks.get(index as usize).and_then(|l| l.as_ref())
    }

    pub fn set(&mut self, index: LandmarkIndex, landmark: Option<Landmark>) {
        if self.landmarks.len() < LandmarkIndex::COUNT {
            self.landmarks.resize(LandmarkIndex::COUNT, None);
        }
        self.landmarks[index as usize] = landmark;
    }

    /// Landmarks whose visibility is strictly above `threshold`.
    pub fn count_visible(&self, threshold: f32) -> usize {
        self.landmarks
            .iter()
            .flatten()
            .filter(|l| l.visibility_or_one() > threshold)
            .count()
    }
}

/// Explicit remapping from another estimator's keypoint order onto the 33-point topology.
#[derive(Debug, Clone)]
pub struct LandmarkRemap {
    table: Vec<(usize, LandmarkIndex)>,
}

/// MoveNet / COCO 17-keypoint order.
pub const COCO17_TO_BODY33: [(usize, LandmarkIndex); 17] = [
    (0, LandmarkIndex::Nose),
    (1, LandmarkIndex::LeftEye),
    (2, LandmarkIndex::RightEye),
    (3, LandmarkIndex::LeftEar),
    (4, LandmarkIndex::RightEar),
    (5, LandmarkIndex::LeftShoulder),
    (6, LandmarkIndex::RightShoulder),
    (7, LandmarkIndex::LeftElbow),
    (8, LandmarkIndex::RightElbow),
    (9, LandmarkIndex::LeftWrist),
    (10, LandmarkIndex::RightWrist),
    (11, LandmarkIndex::LeftHip),
    (12, LandmarkIndex::RightHip),
    (13, LandmarkIndex::LeftKnee),
    (14, LandmarkIndex::RightKnee),
    (15, LandmarkIndex::LeftAnkle),
    (16, LandmarkIndex::RightAnkle),
];

impl LandmarkRemap {
    pub fn new(table: Vec<(usize, LandmarkIndex)>) -> Self {
        Self { table }
    }

    pub fn coco17() -> Self {
        Self::new(COCO17_TO_BODY33.to_vec())
    }

    /// Builds a pose from foreign keypoints; unmapped slots stay `None`.
    pub fn apply(&self, keypoints: &[Landmark]) -> PoseResult {
        let mut pose = PoseResult::from_landmarks(Vec::new());
        for &(source, target) in &self.table {
            if let Some(kp) = keypoints.get(source) {
                pose.set(target, Some(*kp));
            }
        }
        pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_count() {
        assert_eq!(LandmarkIndex::COUNT, 33);
        assert_eq!(LandmarkIndex::ALL.len(), LandmarkIndex::COUNT);
    }

    #[test]
    fn test_landmark_index_from_index() {
        assert_eq!(LandmarkIndex::from_index(0), Some(LandmarkIndex::Nose));
        assert_eq!(LandmarkIndex::from_index(11), Some(LandmarkIndex::LeftShoulder));
        assert_eq!(LandmarkIndex::from_index(28), Some(LandmarkIndex::RightAnkle));
        assert_eq!(LandmarkIndex::from_index(33), None);
        for (i, idx) in LandmarkIndex::ALL.iter().enumerate() {
            assert_eq!(*idx as usize, i);
        }
    }

    #[test]
    fn test_side_convention() {
        assert_eq!(LandmarkIndex::Nose.side(), Side::Center);
        assert_eq!(LandmarkIndex::LeftShoulder.side(), Side::Left);
        assert_eq!(LandmarkIndex::RightHip.side(), Side::Right);
        assert_eq!(LandmarkIndex::LeftFootIndex.side(), Side::Left);
        assert_eq!(LandmarkIndex::LeftEye.side(), Side::Left);
        assert_eq!(LandmarkIndex::RightEyeInner.side(), Side::Right);
    }

    #[test]
    fn test_pose_padding_and_get() {
        let pose = PoseResult::from_landmarks(vec![Some(Landmark::new(0.5, 0.3))]);
        assert_eq!(pose.landmarks.len(), LandmarkIndex::COUNT);
        assert_eq!(pose.world_landmarks.len(), LandmarkIndex::COUNT);
        assert_eq!(pose.get(LandmarkIndex::Nose).map(|l| l.y), Some(0.3));
        assert!(pose.get(LandmarkIndex::LeftHip).is_none());
    }

    #[test]
    fn test_count_visible() {
        let pose = PoseResult::from_landmarks(vec![
            Some(Landmark::with_visibility(0.1, 0.1, 0.9)),
            Some(Landmark::with_visibility(0.1, 0.1, 0.6)),
            Some(Landmark::new(0.1, 0.1)),
            None,
        ]);
        assert_eq!(pose.count_visible(0.6), 2);
    }

    #[test]
    fn test_coco_remap() {
        let mut keypoints = vec![Landmark::default(); 17];
        keypoints[9] = Landmark::new(0.2, 0.7);
        let pose = LandmarkRemap::coco17().apply(&keypoints);
        assert_eq!(pose.get(LandmarkIndex::LeftWrist), Some(&Landmark::new(0.2, 0.7)));
        assert!(pose.get(LandmarkIndex::LeftIndex).is_none());
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25);
        assert_eq!(lm.to_pixel(640, 480), (320, 120));
    }
}
