use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::OnceCell;

use super::landmark::PoseResult;
use crate::blocking::{lock, run_blocking};
use crate::error::{CaptureError, Result};

/// Pose detection capability consumed by the capture pipeline.
#[async_trait]
pub trait PoseSource: Send + Sync {
    /// Stateless detection on an arbitrary frame. Safe for out-of-order access
    /// (seeking, scrubbing), so it is what sampling and peak search use.
    async fn detect_image(&self, frame: &RgbImage) -> Result<Option<PoseResult>>;

    /// Tracking detection for frames decoded in playback order.
    async fn detect_video(&self, frame: &RgbImage, timestamp_ms: u64) -> Result<Option<PoseResult>>;
}

/// Detection model mode. Each mode holds its own model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    Image,
    Video,
}

/// A loaded pose network.
pub trait PoseModel: Send {
    fn detect(&mut self, frame: &RgbImage) -> anyhow::Result<Option<PoseResult>>;

    /// Sequential detection; models without temporal tracking fall back to `detect`.
    fn detect_sequential(&mut self, frame: &RgbImage, _timestamp_ms: u64) -> anyhow::Result<Option<PoseResult>> {
        self.detect(frame)
    }
}

/// Builds a model for a running mode. Called at most once per mode by [`PoseService`].
#[async_trait]
pub trait PoseModelLoader: Send + Sync {
    type Model: PoseModel + 'static;

    async fn load(&self, mode: RunningMode) -> anyhow::Result<Self::Model>;
}

struct SequentialState<M> {
    model: M,
    last_timestamp_ms: Option<u64>,
}

/// Pose capability object, constructed once per session and passed by reference.
///
/// Models are loaded lazily on first use. Concurrent first callers share a single
/// pending load per mode. Inference runs on the blocking pool with a copy of the frame.
pub struct PoseService<L: PoseModelLoader> {
    loader: L,
    image: OnceCell<Arc<Mutex<L::Model>>>,
    video: OnceCell<Arc<Mutex<SequentialState<L::Model>>>>,
}

impl<L: PoseModelLoader> PoseService<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            image: OnceCell::new(),
            video: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self, mode: RunningMode) -> bool {
        match mode {
            RunningMode::Image => self.image.initialized(),
            RunningMode::Video => self.video.initialized(),
        }
    }

    async fn image_model(&self) -> Result<Arc<Mutex<L::Model>>> {
        self.image
            .get_or_try_init(|| async {
                tracing::info!("loading pose model (image mode)");
                self.loader
                    .load(RunningMode::Image)
                    .await
                    .map(|model| Arc::new(Mutex::new(model)))
            })
            .await
            .map(Arc::clone)
            .map_err(CaptureError::Detection)
    }

    async fn video_model(&self) -> Result<Arc<Mutex<SequentialState<L::Model>>>> {
        self.video
            .get_or_try_init(|| async {
                tracing::info!("loading pose model (video mode)");
                self.loader.load(RunningMode::Video).await.map(|model| {
                    Arc::new(Mutex::new(SequentialState {
                        model,
                        last_timestamp_ms: None,
                    }))
                })
            })
            .await
            .map(Arc::clone)
            .map_err(CaptureError::Detection)
    }
}

#[async_trait]
impl<L: PoseModelLoader> PoseSource for PoseService<L> {
    async fn detect_image(&self, frame: &RgbImage) -> Result<Option<PoseResult>> {
        let model = self.image_model().await?;
        let frame = frame.clone();
        run_blocking(move || {
            let mut model = lock(&model, "pose model")?;
            model.detect(&frame).map_err(CaptureError::Detection)
        })
        .await
    }

    async fn detect_video(&self, frame: &RgbImage, timestamp_ms: u64) -> Result<Option<PoseResult>> {
        let state = self.video_model().await?;
        let frame = frame.clone();
        run_blocking(move || {
            let mut state = lock(&state, "pose model")?;
            // Trackers require strictly increasing timestamps.
            let timestamp_ms = match state.last_timestamp_ms {
                Some(last) if timestamp_ms <= last => last + 1,
                _ => timestamp_ms,
            };
            state.last_timestamp_ms = Some(timestamp_ms);
            state
                .model
                .detect_sequential(&frame, timestamp_ms)
                .map_err(CaptureError::Detection)
        })
        .await
    }
}

/// Used when no pose model is configured: every frame is a detection miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPose;

#[async_trait]
impl PoseSource for DisabledPose {
    async fn detect_image(&self, _frame: &RgbImage) -> Result<Option<PoseResult>> {
        Ok(None)
    }

    async fn detect_video(&self, _frame: &RgbImage, _timestamp_ms: u64) -> Result<Option<PoseResult>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use crate::testing::{coded_frame, standing_pose};

    struct RecordingModel {
        timestamps: Arc<StdMutex<Vec<u64>>>,
    }

    impl PoseModel for RecordingModel {
        fn detect(&mut self, _frame: &RgbImage) -> anyhow::Result<Option<PoseResult>> {
            Ok(Some(standing_pose()))
        }

        fn detect_sequential(&mut self, frame: &RgbImage, timestamp_ms: u64) -> anyhow::Result<Option<PoseResult>> {
            self.timestamps.lock().unwrap().push(timestamp_ms);
            self.detect(frame)
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        timestamps: Arc<StdMutex<Vec<u64>>>,
        fail: bool,
    }

    impl CountingLoader {
        fn new(fail: bool) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                timestamps: Arc::new(StdMutex::new(Vec::new())),
                fail,
            }
        }
    }

    #[async_trait]
    impl PoseModelLoader for CountingLoader {
        type Model = RecordingModel;

        async fn load(&self, _mode: RunningMode) -> anyhow::Result<RecordingModel> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                anyhow::bail!("model file missing");
            }
            Ok(RecordingModel {
                timestamps: self.timestamps.clone(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_callers_share_one_load() {
        let service = PoseService::new(CountingLoader::new(false));
        let frame = coded_frame(0);

        let results = futures::future::join_all((0..4).map(|_| service.detect_image(&frame))).await;

        assert!(results.iter().all(|r| matches!(r, Ok(Some(_)))));
        assert_eq!(service.loader.loads.load(Ordering::SeqCst), 1);
        assert!(service.is_loaded(RunningMode::Image));
        assert!(!service.is_loaded(RunningMode::Video));
    }

    #[tokio::test(start_paused = true)]
    async fn test_modes_load_independently() {
        let service = PoseService::new(CountingLoader::new(false));
        let frame = coded_frame(0);
        service.detect_image(&frame).await.unwrap();
        service.detect_video(&frame, 0).await.unwrap();
        service.detect_image(&frame).await.unwrap();
        assert_eq!(service.loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_timestamps_strictly_increase() {
        let service = PoseService::new(CountingLoader::new(false));
        let frame = coded_frame(0);
        for ts in [100, 100, 50, 300] {
            service.detect_video(&frame, ts).await.unwrap();
        }
        assert_eq!(*service.loader.timestamps.lock().unwrap(), vec![100, 101, 102, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_is_retried() {
        let service = PoseService::new(CountingLoader::new(true));
        let frame = coded_frame(0);
        assert!(matches!(
            service.detect_image(&frame).await,
            Err(CaptureError::Detection(_))
        ));
        assert!(service.detect_image(&frame).await.is_err());
        assert_eq!(service.loader.loads.load(Ordering::SeqCst), 2);
    }

    struct SlowModel;

    impl PoseModel for SlowModel {
        fn detect(&mut self, _frame: &RgbImage) -> anyhow::Result<Option<PoseResult>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(None)
        }
    }

    struct SlowLoader;

    #[async_trait]
    impl PoseModelLoader for SlowLoader {
        type Model = SlowModel;

        async fn load(&self, _mode: RunningMode) -> anyhow::Result<SlowModel> {
            Ok(SlowModel)
        }
    }

    #[tokio::test]
    async fn test_inference_leaves_timers_running() {
        let service = PoseService::new(SlowLoader);
        let frame = coded_frame(0);
        let result = tokio::time::timeout(Duration::from_millis(30), service.detect_image(&frame)).await;
        assert!(result.is_err());
        assert!(service.is_loaded(RunningMode::Image));
    }

    #[tokio::test]
    async fn test_disabled_pose_misses() {
        assert!(DisabledPose.detect_image(&coded_frame(0)).await.unwrap().is_none());
    }
}
