use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, CAP_ANY},
};

use super::SeekableSource;
use crate::blocking::{lock, run_blocking};
use crate::error::{CaptureError, Result};

fn cv_err(time: f64, e: opencv::Error) -> CaptureError {
    CaptureError::Seek {
        time,
        message: e.to_string(),
    }
}

/// Owns the OpenCV handle. Only ever touched from the blocking pool.
struct Decoder {
    capture: VideoCapture,
}

impl Decoder {
    fn read_at(&mut self, time: f64) -> Result<RgbImage> {
        self.capture
            .set(videoio::CAP_PROP_POS_MSEC, time * 1000.0)
            .map_err(|e| cv_err(time, e))?;
        let mut frame = Mat::default();
        let ok = self.capture.read(&mut frame).map_err(|e| cv_err(time, e))?;
        if !ok || frame.empty() {
            return Err(CaptureError::Seek {
                time,
                message: "no frame at position".to_string(),
            });
        }
        mat_to_rgb(&frame)
    }
}

fn mat_to_rgb(frame: &Mat) -> Result<RgbImage> {
    let width = frame.cols() as u32;
    let height = frame.rows() as u32;

    let mut out = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let pixel = frame
                .at_2d::<opencv::core::Vec3b>(y as i32, x as i32)
                .map_err(|e| CaptureError::Render(e.to_string()))?;
            // BGR -> RGB
            out.put_pixel(x, y, Rgb([pixel[2], pixel[1], pixel[0]]));
        }
    }
    Ok(out)
}

/// Video file decoded with OpenCV. Seeks by `CAP_PROP_POS_MSEC` and keeps the decoded
/// frame at the current position.
///
/// Decoding runs on the blocking pool, so a stalled decoder trips the seek timeout
/// instead of freezing the runtime. A seek abandoned by its timeout leaves the
/// previous frame and position in place; the next seek waits for the decoder lock.
pub struct OpenCvVideo {
    decoder: Arc<Mutex<Decoder>>,
    duration: f64,
    position: f64,
    current: Option<RgbImage>,
}

impl OpenCvVideo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let capture = VideoCapture::from_file(&path_str, CAP_ANY).map_err(|e| cv_err(0.0, e))?;
        if !capture.is_opened().map_err(|e| cv_err(0.0, e))? {
            return Err(CaptureError::InvalidRequest(format!("cannot open video {path_str}")));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS).map_err(|e| cv_err(0.0, e))?;
        let frames = capture
            .get(videoio::CAP_PROP_FRAME_COUNT)
            .map_err(|e| cv_err(0.0, e))?;
        if fps <= 0.0 || frames <= 0.0 {
            return Err(CaptureError::InvalidRequest(format!(
                "video {path_str} reports no frames ({frames} @ {fps} fps)"
            )));
        }
        let duration = frames / fps;
        tracing::info!("opened {path_str}: {frames} frames @ {fps:.2} fps ({duration:.2}s)");

        let mut decoder = Decoder { capture };
        let first = decoder.read_at(0.0)?;
        Ok(Self {
            decoder: Arc::new(Mutex::new(decoder)),
            duration,
            position: 0.0,
            current: Some(first),
        })
    }
}

#[async_trait]
impl SeekableSource for OpenCvVideo {
    fn duration(&self) -> f64 {
        self.duration
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
        // The last frame starts slightly before `duration`.
        let target = time.clamp(0.0, (self.duration - 1e-3).max(0.0));
        let decoder = Arc::clone(&self.decoder);
        let frame = run_blocking(move || {
            let mut guard = lock(&decoder, "video decoder")?;
            guard.read_at(target)
        })
        .await?;

        self.current = Some(frame);
        self.position = time.clamp(0.0, self.duration);
        Ok(())
    }

    fn draw(&self) -> Result<RgbImage> {
        self.current
            .clone()
            .ok_or_else(|| CaptureError::Render("no decoded frame".to_string()))
    }
}
