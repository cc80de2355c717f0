//! Seekable video sources and the seek-and-restore discipline around them.

#[cfg(feature = "desktop")]
pub mod capture;
pub mod sequence;

use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;

use crate::error::{CaptureError, Result};

#[cfg(feature = "desktop")]
pub use capture::OpenCvVideo;
pub use sequence::FrameSequence;

/// A video whose play position can be moved and whose current frame can be drawn.
///
/// The play position is the only mutable state the capture pipeline shares with a
/// caller, so every component that seeks must restore it (see [`PlaybackGuard`]).
#[async_trait]
pub trait SeekableSource: Send {
    /// Total length in seconds.
    fn duration(&self) -> f64;

    /// Current play position in seconds.
    fn current_time(&self) -> f64;

    /// Moves the play position. Resolves once the seek has completed and
    /// [`draw`](Self::draw) returns the frame at `time`.
    async fn seek(&mut self, time: f64) -> Result<()>;

    /// Renders the frame at the current position.
    fn draw(&self) -> Result<RgbImage>;
}

#[async_trait]
impl<S: SeekableSource + ?Sized> SeekableSource for Box<S> {
    fn duration(&self) -> f64 {
        (**self).duration()
    }

    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    async fn seek(&mut self, time: f64) -> Result<()> {
        (**self).seek(time).await
    }

    fn draw(&self) -> Result<RgbImage> {
        (**self).draw()
    }
}

/// Seeks and waits for completion, giving up after `timeout`.
pub async fn seek_and_wait<S>(source: &mut S, time: f64, timeout: Duration) -> Result<()>
where
    S: SeekableSource + ?Sized,
{
    match tokio::time::timeout(timeout, source.seek(time)).await {
        Ok(result) => result,
        Err(_) => Err(CaptureError::SeekTimeout {
            time,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Records a source's play position so it can be put back after internal seeks.
#[derive(Debug, Clone, Copy)]
#[must_use = "the play position is only restored by calling `restore`"]
pub struct PlaybackGuard {
    original: f64,
}

impl PlaybackGuard {
    pub fn acquire<S: SeekableSource + ?Sized>(source: &S) -> Self {
        Self {
            original: source.current_time(),
        }
    }

    pub fn original(&self) -> f64 {
        self.original
    }

    /// Seeks back to the recorded position unless the source is already there.
    pub async fn restore<S>(self, source: &mut S, timeout: Duration) -> Result<()>
    where
        S: SeekableSource + ?Sized,
    {
        if source.current_time() == self.original {
            return Ok(());
        }
        seek_and_wait(source, self.original, timeout).await
    }

    /// As [`restore`](Self::restore), logging instead of failing.
    pub async fn restore_or_warn<S>(self, source: &mut S, timeout: Duration)
    where
        S: SeekableSource + ?Sized,
    {
        if let Err(e) = self.restore(source, timeout).await {
            tracing::warn!("could not restore play position {:.3}s: {e}", self.original);
        }
    }
}
