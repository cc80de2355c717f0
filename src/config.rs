use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::LandmarkGate;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub peak: PeakConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub pose: PoseModelConfig,
    #[serde(default)]
    pub object: ObjectConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Frames per view
    #[serde(default = "default_frame_count")]
    pub frame_count: usize,
    /// Frame spacing (seconds) around a detected peak
    #[serde(default = "default_peak_interval")]
    pub peak_interval: f64,
    /// JPEG quality (1–100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_seek_timeout_ms")]
    pub seek_timeout_ms: u64,
    /// Capture views concurrently (each view still captures sequentially)
    #[serde(default = "default_true")]
    pub concurrent_views: bool,
    /// Draw skeleton and angle panel onto the captured frames
    #[serde(default = "default_true")]
    pub draw_overlay: bool,
}

fn default_frame_count() -> usize { 5 }
fn default_peak_interval() -> f64 { 0.5 }
fn default_jpeg_quality() -> u8 { 80 }
fn default_seek_timeout_ms() -> u64 { 3000 }
fn default_true() -> bool { true }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_count: default_frame_count(),
            peak_interval: default_peak_interval(),
            jpeg_quality: default_jpeg_quality(),
            seek_timeout_ms: default_seek_timeout_ms(),
            concurrent_views: default_true(),
            draw_overlay: default_true(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PeakConfig {
    /// Scan step (seconds)
    #[serde(default = "default_step_seconds")]
    pub step_seconds: f64,
    /// Fixed bonus when the head is below the hips
    #[serde(default = "default_inversion_bonus")]
    pub inversion_bonus: f32,
    /// Multiplier on the normalized head-below-hip depth
    #[serde(default = "default_inversion_scale")]
    pub inversion_scale: f32,
    /// Landmarks above this visibility earn one point each
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
}

fn default_step_seconds() -> f64 { 0.5 }
fn default_inversion_bonus() -> f32 { 50.0 }
fn default_inversion_scale() -> f32 { 100.0 }
fn default_visibility_threshold() -> f32 { 0.6 }

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            step_seconds: default_step_seconds(),
            inversion_bonus: default_inversion_bonus(),
            inversion_scale: default_inversion_scale(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Max vertical deviation (normalized height) for a pair to count as level
    #[serde(default = "default_level_threshold")]
    pub level_threshold: f32,
    #[serde(default)]
    pub landmark_gate: LandmarkGate,
}

fn default_level_threshold() -> f32 { 0.05 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            level_threshold: default_level_threshold(),
            landmark_gate: LandmarkGate::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoseModelConfig {
    /// ONNX landmark model; no model means every frame is a detection miss
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_pose_input_size")]
    pub input_size: u32,
    #[serde(default = "default_pose_input_name")]
    pub input_name: String,
    #[serde(default = "default_landmarks_output")]
    pub landmarks_output: String,
    #[serde(default = "default_presence_output")]
    pub presence_output: String,
    #[serde(default = "default_world_output")]
    pub world_output: String,
    /// Minimum body presence score to report a pose
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
}

fn default_pose_input_size() -> u32 { 256 }
fn default_pose_input_name() -> String { "input_1".to_string() }
fn default_landmarks_output() -> String { "Identity".to_string() }
fn default_presence_output() -> String { "Identity_1".to_string() }
fn default_world_output() -> String { "Identity_4".to_string() }
fn default_presence_threshold() -> f32 { 0.5 }

impl Default for PoseModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: default_pose_input_size(),
            input_name: default_pose_input_name(),
            landmarks_output: default_landmarks_output(),
            presence_output: default_presence_output(),
            world_output: default_world_output(),
            presence_threshold: default_presence_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObjectConfig {
    /// YOLOv8 ONNX model; object tracking is off without one
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_object_input_size")]
    pub input_size: u32,
    #[serde(default = "default_object_min_score")]
    pub min_score: f32,
    #[serde(default = "default_confidence_weight")]
    pub confidence_weight: f32,
    #[serde(default = "default_label_weight")]
    pub label_weight: f32,
    /// 3x (confidence_weight + label_weight) by default
    #[serde(default = "default_proximity_weight")]
    pub proximity_weight: f32,
    /// Normalized distance from the nearest limb that still counts as in hand / at foot
    #[serde(default = "default_base_reach")]
    pub base_reach: f32,
    /// Extra allowed distance per second since the last valid sighting
    #[serde(default = "default_reach_per_second")]
    pub reach_per_second: f32,
    /// Beyond reach, detections at least this confident are kept as in flight
    #[serde(default = "default_in_flight_confidence")]
    pub in_flight_confidence: f32,
    /// Tracks whose box centre travels less than this (pixels) are background clutter
    #[serde(default = "default_static_travel_px")]
    pub static_travel_px: f32,
}

fn default_object_input_size() -> u32 { 640 }
fn default_object_min_score() -> f32 { 0.25 }
fn default_confidence_weight() -> f32 { 1.0 }
fn default_label_weight() -> f32 { 1.0 }
fn default_proximity_weight() -> f32 { 6.0 }
fn default_base_reach() -> f32 { 0.15 }
fn default_reach_per_second() -> f32 { 0.5 }
fn default_in_flight_confidence() -> f32 { 0.8 }
fn default_static_travel_px() -> f32 { 15.0 }

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: default_object_input_size(),
            min_score: default_object_min_score(),
            confidence_weight: default_confidence_weight(),
            label_weight: default_label_weight(),
            proximity_weight: default_proximity_weight(),
            base_reach: default_base_reach(),
            reach_per_second: default_reach_per_second(),
            in_flight_confidence: default_in_flight_confidence(),
            static_travel_px: default_static_travel_px(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OverlayConfig {
    /// TTF/OTF used for the angle panel text
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Panel background opacity (0.0–1.0)
    #[serde(default = "default_panel_opacity")]
    pub panel_opacity: f32,
}

fn default_font_size() -> f32 { 16.0 }
fn default_panel_opacity() -> f32 { 0.7 }

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: default_font_size(),
            panel_opacity: default_panel_opacity(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Falls back to defaults when the file is missing or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                if path.as_ref().exists() {
                    tracing::warn!("{e:#}; using default config");
                }
                Self::default()
            }
        }
    }
}
