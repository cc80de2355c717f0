//! ONNX Runtime backed pose landmark and object detection models.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::landmark::{Landmark, LandmarkIndex, PoseResult};
use super::object::{BBox, ObjectDetection, ObjectDetector};
use super::source::{PoseModel, PoseModelLoader, RunningMode};
use crate::config::{ObjectConfig, PoseModelConfig};
use crate::blocking::{lock, run_blocking};
use crate::error::CaptureError;

/// Maps letterboxed model coordinates back to normalized frame coordinates.
#[derive(Debug, Clone, Copy)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub frame_width: f32,
    pub frame_height: f32,
}

impl LetterboxInfo {
    /// Model-input pixel → normalized frame coordinate.
    pub fn unletterbox(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x) / self.scale / self.frame_width,
            (y - self.pad_y) / self.scale / self.frame_height,
        )
    }
}

/// Resizes `frame` to fit a `size`×`size` square, padding the short side with black.
pub fn letterbox(frame: &RgbImage, size: u32) -> (RgbImage, LetterboxInfo) {
    let (w, h) = frame.dimensions();
    let scale = size as f32 / w.max(h).max(1) as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::new(size, size);
    image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            frame_width: w as f32,
            frame_height: h as f32,
        },
    )
}

/// [1, H, W, 3] f32 tensor in 0.0–1.0
pub fn to_nhwc(img: &RgbImage) -> Array4<f32> {
    let (w, h) = img.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, h as usize, w as usize, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// [1, 3, H, W] f32 tensor in 0.0–1.0
pub fn to_nchw(img: &RgbImage) -> Array4<f32> {
    let (w, h) = img.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn load_session(path: &std::path::Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load ONNX model {}", path.display()))?;
    Ok(session)
}

/// BlazePose-style landmark network run on the whole (letterboxed) frame.
///
/// Outputs: `landmarks_output` [1, ≥33·5] (x, y, z, visibility logit, presence logit) in
/// input pixels, `presence_output` [1, 1], optional `world_output` [1, ≥33·3] in metres.
pub struct OnnxPoseModel {
    session: Session,
    config: PoseModelConfig,
}

impl OnnxPoseModel {
    pub fn new(config: PoseModelConfig) -> Result<Self> {
        let path = config
            .model_path
            .clone()
            .context("pose.model_path is not set")?;
        let session = load_session(&path)?;
        Ok(Self { session, config })
    }
}

impl PoseModel for OnnxPoseModel {
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<PoseResult>> {
        let size = self.config.input_size;
        let (input, info) = letterbox(frame, size);
        let input_tensor = Tensor::from_array(to_nhwc(&input))?;

        let outputs = self
            .session
            .run(ort::inputs![self.config.input_name.as_str() => input_tensor])
            .context("Pose inference failed")?;

        let presence: ndarray::ArrayViewD<f32> = outputs[self.config.presence_output.as_str()]
            .try_extract_array()
            .context("Failed to extract presence output")?;
        let presence = presence.iter().copied().next().unwrap_or(0.0);
        if presence < self.config.presence_threshold {
            return Ok(None);
        }

        let raw: ndarray::ArrayViewD<f32> = outputs[self.config.landmarks_output.as_str()]
            .try_extract_array()
            .context("Failed to extract landmark output")?;
        let raw: Vec<f32> = raw.iter().copied().collect();
        if raw.len() < LandmarkIndex::COUNT * 5 {
            anyhow::bail!("landmark output has {} values, expected at least {}", raw.len(), LandmarkIndex::COUNT * 5);
        }

        let landmarks = (0..LandmarkIndex::COUNT)
            .map(|i| {
                let v = &raw[i * 5..i * 5 + 5];
                let (x, y) = info.unletterbox(v[0], v[1]);
                Some(Landmark {
                    x,
                    y,
                    z: Some(v[2] / size as f32),
                    visibility: Some(sigmoid(v[3])),
                })
            })
            .collect();

        let world = match outputs.get(self.config.world_output.as_str()) {
            Some(value) => {
                let w: ndarray::ArrayViewD<f32> = value
                    .try_extract_array()
                    .context("Failed to extract world landmark output")?;
                let w: Vec<f32> = w.iter().copied().collect();
                if w.len() >= LandmarkIndex::COUNT * 3 {
                    (0..LandmarkIndex::COUNT)
                        .map(|i| {
                            Some(Landmark {
                                x: w[i * 3],
                                y: w[i * 3 + 1],
                                z: Some(w[i * 3 + 2]),
                                visibility: None,
                            })
                        })
                        .collect()
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        Ok(Some(PoseResult::new(landmarks, world)))
    }
}

/// Loads one [`OnnxPoseModel`] per running mode off the async runtime.
pub struct OnnxPoseLoader {
    config: PoseModelConfig,
}

impl OnnxPoseLoader {
    pub fn new(config: PoseModelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PoseModelLoader for OnnxPoseLoader {
    type Model = OnnxPoseModel;

    async fn load(&self, mode: RunningMode) -> Result<OnnxPoseModel> {
        let config = self.config.clone();
        tracing::debug!("building ONNX session for {mode:?} mode");
        tokio::task::spawn_blocking(move || OnnxPoseModel::new(config)).await?
    }
}

/// COCO classes a ball detector cares about.
const BALL_LIKE_CLASSES: [(usize, &str); 5] = [
    (29, "frisbee"),
    (32, "sports ball"),
    (47, "apple"),
    (49, "orange"),
    (74, "clock"),
];

/// YOLOv8 detector, output [1, 84, N] (cx, cy, w, h, 80 class scores) in input pixels.
pub struct OnnxObjectDetector {
    session: Arc<Mutex<Session>>,
    input_size: u32,
    min_score: f32,
}

impl OnnxObjectDetector {
    pub fn new(config: &ObjectConfig) -> Result<Self> {
        let path = config
            .model_path
            .clone()
            .context("object.model_path is not set")?;
        Ok(Self {
            session: Arc::new(Mutex::new(load_session(&path)?)),
            input_size: config.input_size,
            min_score: config.min_score,
        })
    }
}

fn run_detector(
    session: &mut Session,
    frame: &RgbImage,
    size: u32,
    min_score: f32,
) -> Result<Vec<ObjectDetection>> {
    let (frame_w, frame_h) = frame.dimensions();
    let resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
    let input_tensor = Tensor::from_array(to_nchw(&resized))?;

    let outputs = session
        .run(ort::inputs!["images" => input_tensor])
        .context("Object detection inference failed")?;
    let output: ndarray::ArrayViewD<f32> = outputs["output0"]
        .try_extract_array()
        .context("Failed to extract object detection output")?;

    let scale_x = frame_w as f32 / size as f32;
    let scale_y = frame_h as f32 / size as f32;
    let n = output.shape()[2];

    let mut detections = Vec::new();
    for i in 0..n {
        let best = BALL_LIKE_CLASSES
            .iter()
            .map(|&(class, label)| (label, output[[0, 4 + class, i]]))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((label, score)) = best else { continue };
        if score < min_score {
            continue;
        }
        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];
        detections.push(ObjectDetection {
            bbox: BBox {
                x: (cx - w / 2.0) * scale_x,
                y: (cy - h / 2.0) * scale_y,
                width: w * scale_x,
                height: h * scale_y,
            },
            confidence: score,
            label: label.to_string(),
        });
    }
    Ok(detections)
}

#[async_trait]
impl ObjectDetector for OnnxObjectDetector {
    async fn detect_objects(&self, frame: &RgbImage) -> crate::error::Result<Vec<ObjectDetection>> {
        let session = Arc::clone(&self.session);
        let frame = frame.clone();
        let (size, min_score) = (self.input_size, self.min_score);
        run_blocking(move || {
            let mut session = lock(&session, "object detector")?;
            run_detector(&mut session, &frame, size, min_score).map_err(CaptureError::Detection)
        })
        .await
    }
}
