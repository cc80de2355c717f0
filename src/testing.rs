//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use crate::error::Result;
use crate::pose::{Landmark, LandmarkIndex, PoseResult, PoseSource};
use crate::video::{FrameSequence, SeekableSource};

pub const FRAME_WIDTH: u32 = 64;
pub const FRAME_HEIGHT: u32 = 48;

/// Solid frame whose red channel carries `code`.
pub fn coded_frame(code: u8) -> RgbImage {
    RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([code, 0, 0]))
}

pub fn frame_code(frame: &RgbImage) -> u8 {
    frame.get_pixel(0, 0)[0]
}

/// `count` frames coded 0, 1, 2, …
pub fn coded_sequence(count: usize, fps: f64) -> FrameSequence {
    FrameSequence::new((0..count).map(|i| coded_frame(i as u8)).collect(), fps).unwrap()
}

pub fn standing_pose() -> PoseResult {
    use LandmarkIndex::*;
    let points = [
        (Nose, 0.5, 0.1),
        (LeftShoulder, 0.4, 0.3),
        (RightShoulder, 0.6, 0.3),
        (LeftElbow, 0.35, 0.4),
        (RightElbow, 0.65, 0.4),
        (LeftWrist, 0.33, 0.5),
        (RightWrist, 0.67, 0.5),
        (LeftIndex, 0.32, 0.53),
        (RightIndex, 0.68, 0.53),
        (LeftHip, 0.45, 0.5),
        (RightHip, 0.55, 0.5),
        (LeftKnee, 0.45, 0.7),
        (RightKnee, 0.55, 0.7),
        (LeftAnkle, 0.45, 0.9),
        (RightAnkle, 0.55, 0.9),
        (LeftFootIndex, 0.42, 0.93),
        (RightFootIndex, 0.58, 0.93),
    ];
    let mut pose = PoseResult::from_landmarks(Vec::new());
    for (index, x, y) in points {
        pose.set(index, Some(Landmark::with_visibility(x, y, 0.9)));
    }
    pose
}

/// Standing pose flipped upside down (handstand): nose 0.4 below the hips.
pub fn inverted_pose() -> PoseResult {
    let mut pose = standing_pose();
    for landmark in pose.landmarks.iter_mut().flatten() {
        landmark.y = 1.0 - landmark.y;
    }
    pose
}

/// Answers detections from a table keyed by the frame's code.
#[derive(Default)]
pub struct ScriptedPose {
    poses: HashMap<u8, PoseResult>,
    pub calls: AtomicUsize,
}

impl ScriptedPose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: u8, pose: PoseResult) -> Self {
        self.poses.insert(code, pose);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoseSource for ScriptedPose {
    async fn detect_image(&self, frame: &RgbImage) -> Result<Option<PoseResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.poses.get(&frame_code(frame)).cloned())
    }

    async fn detect_video(&self, frame: &RgbImage, _timestamp_ms: u64) -> Result<Option<PoseResult>> {
        self.detect_image(frame).await
    }
}

/// Wraps a source so seeks to the listed instants never complete.
pub struct StallingSource<S> {
    inner: S,
    stall_at: Vec<f64>,
}

impl<S> StallingSource<S> {
    pub fn new(inner: S, stall_at: Vec<f64>) -> Self {
        Self { inner, stall_at }
    }
}

#[async_trait]
impl<S: SeekableSource> SeekableSource for StallingSource<S> {
    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    async fn seek(&mut self, time: f64) -> Result<()> {
        if self.stall_at.iter().any(|t| (t - time).abs() < 1e-9) {
            std::future::pending::<()>().await;
        }
        self.inner.seek(time).await
    }

    fn draw(&self) -> Result<RgbImage> {
        self.inner.draw()
    }
}
