//! Multi-frame sampling around a center instant.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Serialize;

use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::video::{seek_and_wait, PlaybackGuard, SeekableSource};

/// Lossy-encoded frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub const MIME: &'static str = "image/jpeg";

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            Self::MIME,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameCapture {
    pub image: EncodedImage,
    /// Seconds from the start of the video
    pub timestamp: f64,
}

/// Frames in ascending time order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiFrameCaptureSet {
    pub frames: Vec<FrameCapture>,
    /// Frame at (or nearest to) the requested center instant
    pub center_frame_index: usize,
    /// Timestamps whose slot failed and was skipped
    pub skipped: Vec<f64>,
}

impl MultiFrameCaptureSet {
    pub fn center_frame(&self) -> Option<&FrameCapture> {
        self.frames.get(self.center_frame_index)
    }
}

/// Hook run on every rendered frame before encoding (pose / angle overlays).
#[async_trait]
pub trait FrameDecorator: Send {
    async fn decorate(&mut self, frame: &mut RgbImage, timestamp: f64) -> Result<()>;
}

/// Slot of the center instant in a sample of `count` frames.
pub fn center_index(count: usize) -> usize {
    count.saturating_sub(1) / 2
}

/// `count` instants spaced by `interval` around `center`, clamped into `[0, duration]`.
///
/// Offsets run from `-floor((count-1)/2)` to `floor(count/2)`, so even counts get one
/// extra frame after the center instead of an extra frame overall.
pub fn sample_timestamps(center: f64, count: usize, interval: f64, duration: f64) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let before = ((count - 1) / 2) as i64;
    let after = (count / 2) as i64;
    let upper = duration.max(0.0);
    (-before..=after)
        .map(|i| (center + i as f64 * interval).clamp(0.0, upper))
        .collect()
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<EncodedImage> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode_image(frame)?;
    Ok(EncodedImage {
        bytes,
        width: frame.width(),
        height: frame.height(),
    })
}

/// Captures frames from a seekable source without disturbing its play position.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    jpeg_quality: u8,
    seek_timeout: Duration,
}

impl FrameSampler {
    pub fn new(jpeg_quality: u8, seek_timeout: Duration) -> Self {
        Self {
            jpeg_quality,
            seek_timeout,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.jpeg_quality, Duration::from_millis(config.seek_timeout_ms))
    }

    pub fn seek_timeout(&self) -> Duration {
        self.seek_timeout
    }

    /// Samples `count` frames spaced by `interval` around `center`.
    ///
    /// Frames are captured strictly one after another. A slot whose seek, render,
    /// decoration or encoding fails is skipped, so the set may hold fewer than `count`
    /// frames. The source's play position is restored before returning.
    pub async fn sample<S>(
        &self,
        source: &mut S,
        center: f64,
        count: usize,
        interval: f64,
        mut decorator: Option<&mut dyn FrameDecorator>,
    ) -> Result<MultiFrameCaptureSet>
    where
        S: SeekableSource + ?Sized,
    {
        if count == 0 {
            return Err(CaptureError::InvalidRequest("frame count must be at least 1".to_string()));
        }
        if !center.is_finite() {
            return Err(CaptureError::InvalidRequest(format!("invalid center time {center}")));
        }
        if count > 1 && (!interval.is_finite() || interval < 0.0) {
            return Err(CaptureError::InvalidRequest(format!("invalid interval {interval}")));
        }
        let duration = source.duration();
        if !duration.is_finite() || duration < 0.0 {
            return Err(CaptureError::InvalidRequest(format!("source has invalid duration {duration}")));
        }

        let timestamps = sample_timestamps(center, count, interval, duration);
        let requested_center = center.clamp(0.0, duration);
        let center_slot = center_index(count);

        let guard = PlaybackGuard::acquire(source);
        let mut set = MultiFrameCaptureSet::default();
        let mut center_position = None;

        for (slot, &t) in timestamps.iter().enumerate() {
            match self.capture_at(source, t, decorator.as_deref_mut()).await {
                Ok(frame) => {
                    tracing::debug!("captured slot {}/{} at {:.3}s", slot + 1, count, t);
                    if slot == center_slot {
                        center_position = Some(set.frames.len());
                    }
                    set.frames.push(frame);
                }
                Err(e) => {
                    tracing::warn!("skipping frame at {:.3}s: {e}", t);
                    set.skipped.push(t);
                }
            }
        }

        guard.restore_or_warn(source, self.seek_timeout).await;

        set.center_frame_index = center_position.unwrap_or_else(|| nearest_index(&set.frames, requested_center));
        tracing::debug!(
            "sampled {}/{} frames around {:.3}s (center index {})",
            set.frames.len(),
            count,
            requested_center,
            set.center_frame_index
        );
        Ok(set)
    }

    /// Captures the single frame at `time`, restoring the play position afterwards.
    pub async fn capture_single<S>(
        &self,
        source: &mut S,
        time: f64,
        decorator: Option<&mut dyn FrameDecorator>,
    ) -> Result<FrameCapture>
    where
        S: SeekableSource + ?Sized,
    {
        let guard = PlaybackGuard::acquire(source);
        let time = time.clamp(0.0, source.duration().max(0.0));
        let result = self.capture_at(source, time, decorator).await;
        guard.restore_or_warn(source, self.seek_timeout).await;
        result
    }

    async fn capture_at<S, D>(&self, source: &mut S, time: f64, decorator: Option<&mut D>) -> Result<FrameCapture>
    where
        S: SeekableSource + ?Sized,
        D: FrameDecorator + ?Sized,
    {
        if source.current_time() != time {
            seek_and_wait(source, time, self.seek_timeout).await?;
        }
        let mut frame = source.draw()?;
        if let Some(decorator) = decorator {
            decorator.decorate(&mut frame, time).await?;
        }
        let image = encode_jpeg(&frame, self.jpeg_quality)?;
        Ok(FrameCapture {
            image,
            timestamp: time,
        })
    }
}

/// Earliest frame closest to `time`; 0 for an empty set.
fn nearest_index(frames: &[FrameCapture], time: f64) -> usize {
    frames
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.timestamp - time).abs().total_cmp(&(b.timestamp - time).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
