//! Multi-view capture: peak search, sampling, per-frame telemetry and payload assembly.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use image::RgbImage;
use tokio_util::sync::CancellationToken;

use super::index_map::{build_index_map, IndexMap};
use super::peak::{PeakFinder, PeakMoment};
use super::sampler::{FrameCapture, FrameDecorator, FrameSampler, MultiFrameCaptureSet};
use crate::analysis::{analyze_symmetry, joint_angles, JointAngle, LandmarkGate, SymmetryAssessment};
use crate::config::{CaptureConfig, Config};
use crate::error::{CaptureError, Result};
use crate::pose::{ObjectDetector, ObjectScoring, ObjectTracker, PoseResult, PoseSource, TrackedObject};
use crate::telemetry::{format_telemetry, OverlayRenderer};
use crate::video::SeekableSource;

/// One labelled video.
pub struct ViewInput<S> {
    pub label: String,
    pub source: S,
}

impl<S> ViewInput<S> {
    pub fn new(label: impl Into<String>, source: S) -> Self {
        Self {
            label: label.into(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Frames per view
    pub frame_count: usize,
    /// Center sampling on the detected peak instead of the middle of the video
    pub smart_search: bool,
    /// Passed through to the oracle
    pub user_declared_skill: Option<String>,
}

impl CaptureOptions {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            frame_count: config.frame_count,
            smart_search: false,
            user_declared_skill: None,
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

/// Captured frames of one view plus the measurements taken at its center frame.
#[derive(Debug, Clone, Default)]
pub struct ViewCapture {
    pub label: String,
    pub frames: Vec<FrameCapture>,
    pub center_frame_index: usize,
    pub skipped: Vec<f64>,
    pub peak: Option<PeakMoment>,
    pub center_telemetry: Option<String>,
    pub center_angles: Vec<JointAngle>,
    pub center_symmetry: Option<SymmetryAssessment>,
    pub object_track: Vec<TrackedObject>,
}

impl ViewCapture {
    pub fn new(label: impl Into<String>, frames: Vec<FrameCapture>) -> Self {
        Self {
            label: label.into(),
            frames,
            ..Self::default()
        }
    }

    pub fn center_frame(&self) -> Option<&FrameCapture> {
        self.frames.get(self.center_frame_index)
    }
}

/// Views in caller order, each view's frames in ascending time order.
#[derive(Debug, Clone)]
pub struct MultiViewPayload {
    pub views: Vec<ViewCapture>,
    pub index_map: IndexMap,
    pub user_declared_skill: Option<String>,
}

impl MultiViewPayload {
    pub fn total_frames(&self) -> usize {
        self.views.iter().map(|v| v.frames.len()).sum()
    }
}

struct FrameObservation {
    timestamp: f64,
    pose: Option<PoseResult>,
}

/// Detects pose (and object) on each captured frame and draws the overlay.
struct TelemetryDecorator<'a, P: ?Sized> {
    pose: &'a P,
    objects: Option<&'a dyn ObjectDetector>,
    overlay: Option<&'a OverlayRenderer>,
    gate: LandmarkGate,
    tracker: Option<ObjectTracker>,
    observations: Vec<FrameObservation>,
}

impl<P: ?Sized> TelemetryDecorator<'_, P> {
    fn pose_at(&self, timestamp: f64) -> Option<&PoseResult> {
        self.observations
            .iter()
            .find(|o| o.timestamp == timestamp)
            .and_then(|o| o.pose.as_ref())
    }
}

#[async_trait]
impl<P: PoseSource + ?Sized> FrameDecorator for TelemetryDecorator<'_, P> {
    async fn decorate(&mut self, frame: &mut RgbImage, timestamp: f64) -> Result<()> {
        let pose = match self.pose.detect_image(frame).await {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!("pose detection failed at {:.3}s: {e}", timestamp);
                None
            }
        };

        if let (Some(objects), Some(tracker)) = (self.objects, self.tracker.as_mut()) {
            let detections = objects.detect_objects(frame).await.unwrap_or_else(|e| {
                tracing::warn!("object detection failed at {:.3}s: {e}", timestamp);
                Vec::new()
            });
            tracker.observe(timestamp, &detections, pose.as_ref(), frame.width(), frame.height());
        }

        if let Some(overlay) = self.overlay {
            let angles = pose.as_ref().map(|p| joint_angles(p, self.gate)).unwrap_or_default();
            overlay.draw(frame, pose.as_ref(), &angles);
        }

        self.observations.push(FrameObservation { timestamp, pose });
        Ok(())
    }
}

/// Drives peak search and sampling over every view and assembles the payload.
pub struct CaptureOrchestrator<'a, P: PoseSource + ?Sized> {
    pose: &'a P,
    objects: Option<&'a dyn ObjectDetector>,
    overlay: Option<&'a OverlayRenderer>,
    sampler: FrameSampler,
    peak_finder: PeakFinder,
    peak_interval: f64,
    concurrent_views: bool,
    draw_overlay: bool,
    gate: LandmarkGate,
    level_threshold: f32,
    scoring: ObjectScoring,
}

impl<'a, P: PoseSource + ?Sized> CaptureOrchestrator<'a, P> {
    pub fn new(pose: &'a P, config: &Config) -> Self {
        let seek_timeout = Duration::from_millis(config.capture.seek_timeout_ms);
        Self {
            pose,
            objects: None,
            overlay: None,
            sampler: FrameSampler::from_config(&config.capture),
            peak_finder: PeakFinder::new(&config.peak, seek_timeout),
            peak_interval: config.capture.peak_interval,
            concurrent_views: config.capture.concurrent_views,
            draw_overlay: config.capture.draw_overlay,
            gate: config.analysis.landmark_gate,
            level_threshold: config.analysis.level_threshold,
            scoring: ObjectScoring::from(&config.object).with_gate(config.analysis.landmark_gate),
        }
    }

    pub fn with_object_detector(mut self, detector: &'a dyn ObjectDetector) -> Self {
        self.objects = Some(detector);
        self
    }

    /// Overlay drawn on every frame unless `capture.draw_overlay` is off.
    pub fn with_overlay(mut self, overlay: &'a OverlayRenderer) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Captures every view and assembles the payload.
    ///
    /// Each source's play position is left where it was found. Fails with
    /// [`CaptureError::NoInput`] when no view produced a single frame.
    pub async fn capture<S>(
        &self,
        views: &mut [ViewInput<S>],
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> Result<MultiViewPayload>
    where
        S: SeekableSource,
    {
        validate_views(views)?;
        if options.frame_count == 0 {
            return Err(CaptureError::InvalidRequest("frame count must be at least 1".to_string()));
        }

        let view_count = views.len();
        let captures = if self.concurrent_views {
            join_all(views.iter_mut().map(|v| self.capture_view(v, options, cancel)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>>>()?
        } else {
            let mut captures = Vec::with_capacity(view_count);
            for view in views.iter_mut() {
                captures.push(self.capture_view(view, options, cancel).await?);
            }
            captures
        };

        let payload = MultiViewPayload {
            index_map: build_index_map(&captures),
            views: captures,
            user_declared_skill: options.user_declared_skill.clone(),
        };
        if payload.total_frames() == 0 {
            return Err(CaptureError::NoInput { views: view_count });
        }
        tracing::info!(
            "captured {} frame(s) across {} view(s)",
            payload.total_frames(),
            view_count
        );
        Ok(payload)
    }

    async fn capture_view<S>(
        &self,
        view: &mut ViewInput<S>,
        options: &CaptureOptions,
        cancel: &CancellationToken,
    ) -> Result<ViewCapture>
    where
        S: SeekableSource,
    {
        let source = &mut view.source;
        let duration = source.duration();

        let peak = if options.smart_search {
            self.peak_finder.find_peak(source, self.pose, cancel).await?
        } else {
            None
        };

        let mut decorator = TelemetryDecorator {
            pose: self.pose,
            objects: self.objects,
            overlay: self.overlay.filter(|_| self.draw_overlay),
            gate: self.gate,
            tracker: self.objects.map(|_| ObjectTracker::new(self.scoring.clone())),
            observations: Vec::new(),
        };

        let set = if options.frame_count == 1 {
            let at = peak.map_or_else(|| source.current_time(), |p| p.time);
            match self.sampler.capture_single(source, at, Some(&mut decorator)).await {
                Ok(frame) => MultiFrameCaptureSet {
                    frames: vec![frame],
                    center_frame_index: 0,
                    skipped: Vec::new(),
                },
                Err(e) => {
                    tracing::warn!("view '{}': frame at {:.3}s failed: {e}", view.label, at);
                    MultiFrameCaptureSet {
                        skipped: vec![at],
                        ..MultiFrameCaptureSet::default()
                    }
                }
            }
        } else {
            let (center, interval) = match peak {
                Some(p) => (p.time, self.peak_interval),
                None => (duration / 2.0, duration / options.frame_count as f64),
            };
            self.sampler
                .sample(source, center, options.frame_count, interval, Some(&mut decorator))
                .await?
        };

        let center_pose = set
            .center_frame()
            .and_then(|frame| decorator.pose_at(frame.timestamp));
        let (center_angles, center_symmetry) = match center_pose {
            Some(pose) => (
                joint_angles(pose, self.gate),
                Some(analyze_symmetry(pose, self.gate, self.level_threshold)),
            ),
            None => (Vec::new(), None),
        };
        let center_telemetry = format_telemetry(&center_angles, center_symmetry.as_ref());
        let object_track = decorator.tracker.take().map(ObjectTracker::finish).unwrap_or_default();

        tracing::info!(
            "view '{}': {} frame(s), {} skipped, telemetry {}",
            view.label,
            set.frames.len(),
            set.skipped.len(),
            if center_telemetry.is_some() { "ok" } else { "none" }
        );

        Ok(ViewCapture {
            label: view.label.clone(),
            frames: set.frames,
            center_frame_index: set.center_frame_index,
            skipped: set.skipped,
            peak,
            center_telemetry,
            center_angles,
            center_symmetry,
            object_track,
        })
    }
}

fn validate_views<S: SeekableSource>(views: &[ViewInput<S>]) -> Result<()> {
    if views.is_empty() {
        return Err(CaptureError::NoInput { views: 0 });
    }
    let mut labels = HashSet::new();
    for view in views {
        let invalid = |reason: String| CaptureError::InvalidView {
            label: view.label.clone(),
            reason,
        };
        if view.label.trim().is_empty() {
            return Err(invalid("label is empty".to_string()));
        }
        if !labels.insert(view.label.as_str()) {
            return Err(invalid("label is used by more than one view".to_string()));
        }
        let duration = view.source.duration();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(invalid(format!("duration {duration} is not usable")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sampler::sample_timestamps;
    use crate::pose::{BBox, LandmarkIndex, ObjectDetection, ObjectStatus};
    use crate::testing::{
        coded_sequence, frame_code, inverted_pose, standing_pose, ScriptedPose, StallingSource, FRAME_HEIGHT,
        FRAME_WIDTH,
    };
    use crate::video::FrameSequence;

    fn config() -> Config {
        let mut config = Config::default();
        config.capture.draw_overlay = false;
        config
    }

    fn options(frame_count: usize, smart_search: bool) -> CaptureOptions {
        CaptureOptions {
            frame_count,
            smart_search,
            user_declared_skill: None,
        }
    }

    fn timestamps(view: &ViewCapture) -> Vec<f64> {
        view.frames.iter().map(|f| f.timestamp).collect()
    }

    fn two_views() -> Vec<ViewInput<FrameSequence>> {
        vec![
            ViewInput::new("Front", coded_sequence(100, 10.0)),
            ViewInput::new("Side", coded_sequence(60, 10.0)),
        ]
    }

    #[tokio::test]
    async fn test_two_views_in_order_with_center_telemetry() {
        let pose = ScriptedPose::new().with(50, standing_pose());
        let config = config();
        let orchestrator = CaptureOrchestrator::new(&pose, &config);
        let mut views = two_views();
        views[1].source.seek(1.2).await.unwrap();

        let payload = orchestrator
            .capture(&mut views, &options(3, false), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(payload.views.len(), 2);
        assert_eq!(payload.views[0].label, "Front");
        assert_eq!(payload.views[1].label, "Side");
        assert_eq!(timestamps(&payload.views[0]), sample_timestamps(5.0, 3, 10.0 / 3.0, 10.0));
        assert_eq!(payload.views[1].frames.len(), 3);
        assert_eq!(payload.index_map.len(), 6);
        assert_eq!(payload.index_map.lookup(4).unwrap().view_label, "Side");

        let front = &payload.views[0];
        assert_eq!(front.center_frame().unwrap().timestamp, 5.0);
        let telemetry = front.center_telemetry.as_deref().unwrap();
        assert!(telemetry.contains("Shoulder: L="));
        assert_eq!(front.center_angles.len(), 12);
        assert!(payload.views[1].center_telemetry.is_none());

        assert_eq!(views[0].source.current_time(), 0.0);
        assert_eq!(views[1].source.current_time(), 1.2);
        assert_eq!(pose.calls(), 6);
    }

    #[tokio::test]
    async fn test_smart_search_centers_on_peak() {
        let pose = ScriptedPose::new().with(20, standing_pose()).with(70, inverted_pose());
        let config = config();
        let orchestrator = CaptureOrchestrator::new(&pose, &config);
        let mut views = vec![ViewInput::new("Side", coded_sequence(100, 10.0))];

        let payload = orchestrator
            .capture(&mut views, &options(3, true), &CancellationToken::new())
            .await
            .unwrap();

        let view = &payload.views[0];
        assert_eq!(view.peak.unwrap().time, 7.0);
        assert_eq!(timestamps(view), vec![6.5, 7.0, 7.5]);
        assert_eq!(view.center_frame_index, 1);
        assert!(view.center_telemetry.is_some());
    }

    #[tokio::test]
    async fn test_single_frame_at_current_position() {
        let pose = ScriptedPose::new();
        let config = config();
        let orchestrator = CaptureOrchestrator::new(&pose, &config);
        let mut views = vec![ViewInput::new("Front", coded_sequence(100, 10.0))];
        views[0].source.seek(2.0).await.unwrap();

        let payload = orchestrator
            .capture(&mut views, &options(1, false), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(timestamps(&payload.views[0]), vec![2.0]);
        assert_eq!(payload.views[0].center_frame_index, 0);
        assert_eq!(views[0].source.current_time(), 2.0);
    }

    #[tokio::test]
    async fn test_single_frame_at_peak_restores_position() {
        let pose = ScriptedPose::new().with(20, standing_pose()).with(70, inverted_pose());
        let config = config();
        let orchestrator = CaptureOrchestrator::new(&pose, &config);
        let mut views = vec![ViewInput::new("Side", coded_sequence(100, 10.0))];
        views[0].source.seek(3.0).await.unwrap();

        let payload = orchestrator
            .capture(&mut views, &options(1, true), &CancellationToken::new())
            .await
            .unwrap();

        let view = &payload.views[0];
        assert_eq!(view.peak.unwrap().time, 7.0);
        assert_eq!(timestamps(view), vec![7.0]);
        assert_eq!(view.center_frame_index, 0);
        assert!(view.center_telemetry.is_some());
        assert_eq!(views[0].source.current_time(), 3.0);
    }

    #[tokio::test]
    async fn test_sequential_matches_concurrent() {
        let pose = ScriptedPose::new().with(30, standing_pose());
        let mut sequential = config();
        sequential.capture.concurrent_views = false;
        let concurrent = config();

        let mut a = two_views();
        let mut b = two_views();
        let token = CancellationToken::new();
        let pa = CaptureOrchestrator::new(&pose, &sequential)
            .capture(&mut a, &options(4, false), &token)
            .await
            .unwrap();
        let pb = CaptureOrchestrator::new(&pose, &concurrent)
            .capture(&mut b, &options(4, false), &token)
            .await
            .unwrap();

        assert_eq!(pa.index_map, pb.index_map);
        assert_eq!(pa.views[1].center_telemetry, pb.views[1].center_telemetry);
    }

    #[tokio::test]
    async fn test_view_validation() {
        let pose = ScriptedPose::new();
        let config = config();
        let orchestrator = CaptureOrchestrator::new(&pose, &config);
        let token = CancellationToken::new();

        let mut none: Vec<ViewInput<FrameSequence>> = Vec::new();
        assert!(matches!(
            orchestrator.capture(&mut none, &options(3, false), &token).await,
            Err(CaptureError::NoInput { views: 0 })
        ));

        let mut dup = vec![
            ViewInput::new("Front", coded_sequence(10, 10.0)),
            ViewInput::new("Front", coded_sequence(10, 10.0)),
        ];
        assert!(matches!(
            orchestrator.capture(&mut dup, &options(3, false), &token).await,
            Err(CaptureError::InvalidView { .. })
        ));

        let mut unnamed = vec![ViewInput::new(" ", coded_sequence(10, 10.0))];
        assert!(matches!(
            orchestrator.capture(&mut unnamed, &options(3, false), &token).await,
            Err(CaptureError::InvalidView { .. })
        ));

        for duration in [0.0, f64::NAN, f64::INFINITY] {
            let mut unloaded = vec![ViewInput::new("Front", FixedDuration(duration))];
            assert!(matches!(
                orchestrator.capture(&mut unloaded, &options(3, false), &token).await,
                Err(CaptureError::InvalidView { .. })
            ));
        }
    }

    /// A source that reports `duration` and never changes position.
    struct FixedDuration(f64);

    #[async_trait]
    impl SeekableSource for FixedDuration {
        fn duration(&self) -> f64 {
            self.0
        }

        fn current_time(&self) -> f64 {
            0.0
        }

        async fn seek(&mut self, _time: f64) -> Result<()> {
            Ok(())
        }

        fn draw(&self) -> Result<RgbImage> {
            Ok(RgbImage::new(1, 1))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_frames_is_no_input() {
        let pose = ScriptedPose::new();
        let config = config();
        let orchestrator = CaptureOrchestrator::new(&pose, &config);
        let stalls = sample_timestamps(5.0, 3, 10.0 / 3.0, 10.0);
        let mut views = vec![ViewInput::new("Front", StallingSource::new(coded_sequence(100, 10.0), stalls))];

        let err = orchestrator
            .capture(&mut views, &options(3, false), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::NoInput { views: 1 }));
        assert!(err.to_string().contains("no video input detected"));
    }

    #[tokio::test]
    async fn test_cancelled_peak_search_fails_the_capture() {
        let pose = ScriptedPose::new();
        let config = config();
        let orchestrator = CaptureOrchestrator::new(&pose, &config);
        let token = CancellationToken::new();
        token.cancel();
        let mut views = vec![ViewInput::new("Front", coded_sequence(100, 10.0))];

        let err = orchestrator
            .capture(&mut views, &options(3, true), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Cancelled));
    }

    /// Always reports one ball next to the left wrist of [`standing_pose`], drifting right.
    struct BallNearWrist;

    #[async_trait]
    impl ObjectDetector for BallNearWrist {
        async fn detect_objects(&self, frame: &RgbImage) -> Result<Vec<ObjectDetection>> {
            let wrist = standing_pose().get(LandmarkIndex::LeftWrist).copied().unwrap();
            let code = frame_code(frame) as f32;
            let cx = wrist.x * FRAME_WIDTH as f32 + code / 4.0;
            let cy = wrist.y * FRAME_HEIGHT as f32;
            Ok(vec![ObjectDetection {
                bbox: BBox {
                    x: cx - 2.0,
                    y: cy - 2.0,
                    width: 4.0,
                    height: 4.0,
                },
                confidence: 0.7,
                label: "sports ball".to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn test_object_track_is_recorded() {
        let pose = ScriptedPose::new().with(16, standing_pose()).with(50, standing_pose()).with(83, standing_pose());
        let config = config();
        let detector = BallNearWrist;
        let orchestrator = CaptureOrchestrator::new(&pose, &config).with_object_detector(&detector);
        let mut views = vec![ViewInput::new("Front", coded_sequence(100, 10.0))];

        let payload = orchestrator
            .capture(&mut views, &options(3, false), &CancellationToken::new())
            .await
            .unwrap();

        let track = &payload.views[0].object_track;
        assert_eq!(track.len(), 3);
        assert!(track
            .iter()
            .all(|t| t.candidate.as_ref().is_some_and(|c| c.status == ObjectStatus::Valid)));
    }

    #[tokio::test]
    async fn test_overlay_marks_frames() {
        let pose = ScriptedPose::new().with(50, standing_pose());
        let mut config = config();
        config.capture.draw_overlay = true;
        let overlay = OverlayRenderer::new(None, 16.0, 0.7, LandmarkGate::Presence);
        let orchestrator = CaptureOrchestrator::new(&pose, &config).with_overlay(&overlay);
        let mut plain_views = vec![ViewInput::new("Front", coded_sequence(100, 10.0))];
        let mut drawn_views = vec![ViewInput::new("Front", coded_sequence(100, 10.0))];

        let plain = CaptureOrchestrator::new(&pose, &Config::default())
            .capture(&mut plain_views, &options(3, false), &CancellationToken::new())
            .await
            .unwrap();
        let drawn = orchestrator
            .capture(&mut drawn_views, &options(3, false), &CancellationToken::new())
            .await
            .unwrap();

        assert_ne!(
            plain.views[0].frames[1].image.bytes,
            drawn.views[0].frames[1].image.bytes
        );
    }
}
