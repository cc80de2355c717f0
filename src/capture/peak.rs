//! Coarse scan for the most "extreme" moment of a movement.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::PeakConfig;
use crate::error::{CaptureError, Result};
use crate::pose::{LandmarkIndex, PoseResult, PoseSource};
use crate::video::{seek_and_wait, PlaybackGuard, SeekableSource};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakMoment {
    pub time: f64,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct PeakScoring {
    pub inversion_bonus: f32,
    pub inversion_scale: f32,
    pub visibility_threshold: f32,
}

impl From<&PeakConfig> for PeakScoring {
    fn from(c: &PeakConfig) -> Self {
        Self {
            inversion_bonus: c.inversion_bonus,
            inversion_scale: c.inversion_scale,
            visibility_threshold: c.visibility_threshold,
        }
    }
}

impl Default for PeakScoring {
    fn default() -> Self {
        Self::from(&PeakConfig::default())
    }
}

/// Heuristic "peak-ness" of a pose.
///
/// Inverted bodies (nose below the hip midpoint, image y grows downward) get a large
/// bonus that grows with the depth of the inversion. Every confidently visible landmark
/// adds one point, so clear full-body frames beat partial ones.
pub fn score_pose(pose: &PoseResult, scoring: &PeakScoring) -> f32 {
    let mut score = 0.0;

    let nose = pose.get(LandmarkIndex::Nose).filter(|l| l.is_finite());
    let left_hip = pose.get(LandmarkIndex::LeftHip).filter(|l| l.is_finite());
    let right_hip = pose.get(LandmarkIndex::RightHip).filter(|l| l.is_finite());
    if let (Some(nose), Some(lh), Some(rh)) = (nose, left_hip, right_hip) {
        let hip_y = (lh.y + rh.y) / 2.0;
        let depth = nose.y - hip_y;
        if depth > 0.0 {
            score += scoring.inversion_bonus + scoring.inversion_scale * depth;
        }
    }

    score + pose.count_visible(scoring.visibility_threshold) as f32
}

pub struct PeakFinder {
    step: f64,
    scoring: PeakScoring,
    seek_timeout: Duration,
}

impl PeakFinder {
    pub fn new(config: &PeakConfig, seek_timeout: Duration) -> Self {
        Self {
            step: config.step_seconds,
            scoring: PeakScoring::from(config),
            seek_timeout,
        }
    }

    /// Scan instants `0, step, 2·step, … < duration`.
    pub fn scan_times(&self, duration: f64) -> Vec<f64> {
        if !(self.step > 0.0) || !duration.is_finite() {
            return Vec::new();
        }
        (0..)
            .map(|i| i as f64 * self.step)
            .take_while(|&t| t < duration)
            .collect()
    }

    /// Scans the whole source and returns the best-scoring instant, or `None` when no
    /// step produced a pose. Ties keep the earliest instant.
    ///
    /// The play position is restored before returning, including on cancellation.
    pub async fn find_peak<S, P>(
        &self,
        source: &mut S,
        pose: &P,
        cancel: &CancellationToken,
    ) -> Result<Option<PeakMoment>>
    where
        S: SeekableSource + ?Sized,
        P: PoseSource + ?Sized,
    {
        let guard = PlaybackGuard::acquire(source);
        let times = self.scan_times(source.duration());
        let mut best: Option<PeakMoment> = None;

        for t in times {
            if cancel.is_cancelled() {
                guard.restore_or_warn(source, self.seek_timeout).await;
                return Err(CaptureError::Cancelled);
            }

            let stepped = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = self.score_step(source, pose, t) => Some(r),
            };
            let Some(stepped) = stepped else {
                guard.restore_or_warn(source, self.seek_timeout).await;
                return Err(CaptureError::Cancelled);
            };

            match stepped {
                Ok(Some(score)) => {
                    if best.map_or(true, |b| score > b.score) {
                        best = Some(PeakMoment { time: t, score });
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("peak scan skipped {:.2}s: {e}", t),
            }
        }

        guard.restore_or_warn(source, self.seek_timeout).await;
        match best {
            Some(peak) => tracing::info!("peak at {:.2}s (score {:.1})", peak.time, peak.score),
            None => tracing::info!("peak scan found no pose"),
        }
        Ok(best)
    }

    async fn score_step<S, P>(&self, source: &mut S, pose: &P, t: f64) -> Result<Option<f32>>
    where
        S: SeekableSource + ?Sized,
        P: PoseSource + ?Sized,
    {
        seek_and_wait(source, t, self.seek_timeout).await?;
        let frame = source.draw()?;
        let detected = pose.detect_image(&frame).await?;
        Ok(detected.map(|p| score_pose(&p, &self.scoring)))
    }
}
