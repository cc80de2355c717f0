use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;

use super::SeekableSource;
use crate::error::{CaptureError, Result};

/// Decoded frames at a fixed frame rate.
///
/// Frame `i` is shown for `[i / fps, (i + 1) / fps)`. Seeking past the end shows the last
/// frame, like a media element parked at its end.
pub struct FrameSequence {
    frames: Vec<RgbImage>,
    fps: f64,
    position: f64,
    seek_latency: Duration,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Result<Self> {
        if frames.is_empty() {
            return Err(CaptureError::InvalidRequest("frame sequence is empty".to_string()));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CaptureError::InvalidRequest(format!("invalid frame rate {fps}")));
        }
        Ok(Self {
            frames,
            fps,
            position: 0.0,
            seek_latency: Duration::ZERO,
        })
    }

    /// Loads every PNG/JPEG in `dir`, ordered by file name.
    pub fn from_dir<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let img = image::open(path).map_err(|source| CaptureError::Load {
                path: path.display().to_string(),
                source,
            })?;
            frames.push(img.to_rgb8());
        }

        tracing::info!(
            "loaded {} frames from {} @ {:.2} fps",
            frames.len(),
            dir.as_ref().display(),
            fps
        );
        Self::new(frames, fps)
    }

    /// Delays every seek, emulating a decoder that completes seeks asynchronously.
    pub fn with_seek_latency(mut self, latency: Duration) -> Self {
        self.seek_latency = latency;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Index of the frame shown at `time`.
    pub fn frame_index(&self, time: f64) -> usize {
        let index = (time.max(0.0) * self.fps + 1e-9).floor() as usize;
        index.min(self.frames.len() - 1)
    }
}

#[async_trait]
impl SeekableSource for FrameSequence {
    fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.fps
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    async fn seek(&mut self, time: f64) -> Result<()> {
        if !time.is_finite() {
            return Err(CaptureError::Seek {
                time,
                message: "non-finite position".to_string(),
            });
        }
        if self.seek_latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.seek_latency).await;
        }
        self.position = time.clamp(0.0, self.duration());
        Ok(())
    }

    fn draw(&self) -> Result<RgbImage> {
        Ok(self.frames[self.frame_index(self.position)].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{coded_frame, frame_code};

    #[test]
    fn test_rejects_empty_and_bad_fps() {
        assert!(FrameSequence::new(Vec::new(), 30.0).is_err());
        assert!(FrameSequence::new(vec![coded_frame(0)], 0.0).is_err());
        assert!(FrameSequence::new(vec![coded_frame(0)], f64::NAN).is_err());
    }

    #[test]
    fn test_duration_and_frame_index() {
        let seq = FrameSequence::new((0..20).map(coded_frame).collect(), 10.0).unwrap();
        assert_eq!(seq.duration(), 2.0);
        assert_eq!(seq.frame_index(0.0), 0);
        assert_eq!(seq.frame_index(0.3), 3);
        assert_eq!(seq.frame_index(0.35), 3);
        assert_eq!(seq.frame_index(2.0), 19);
        assert_eq!(seq.frame_index(99.0), 19);
    }

    #[tokio::test]
    async fn test_seek_then_draw() {
        let mut seq = FrameSequence::new((0..20).map(coded_frame).collect(), 10.0).unwrap();
        seq.seek(1.5).await.unwrap();
        assert_eq!(seq.current_time(), 1.5);
        assert_eq!(frame_code(&seq.draw().unwrap()), 15);

        seq.seek(-3.0).await.unwrap();
        assert_eq!(seq.current_time(), 0.0);
        assert!(seq.seek(f64::INFINITY).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_latency() {
        let mut seq = FrameSequence::new(vec![coded_frame(0), coded_frame(1)], 1.0)
            .unwrap()
            .with_seek_latency(Duration::from_millis(40));
        let start = tokio::time::Instant::now();
        seq.seek(1.0).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(frame_code(&seq.draw().unwrap()), 1);
    }

    #[test]
    fn test_from_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for (name, code) in [("frame_002.png", 2u8), ("frame_000.png", 0), ("frame_001.png", 1)] {
            coded_frame(code).save(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let seq = FrameSequence::from_dir(dir.path(), 2.0).unwrap();
        assert_eq!(seq.frame_count(), 3);
        assert_eq!(seq.duration(), 1.5);
    }
}
