//! Frame decimation plan

use crate::DEFAULT_TARGET_FPS;
use serde::{Deserialize, Serialize};

/// How a video of a given length and frame rate is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPlan {
    /// Container duration in seconds (0 when unknown)
    pub duration_secs: f64,
    /// Native frame rate of the stream
    pub native_fps: f64,
    /// Every `frame_step`-th native frame is analysed
    pub frame_step: u64,
    /// Effective analysis rate (`native_fps / frame_step`)
    pub sampling_fps: f64,
    /// Estimated native frame count, at least 1
    pub total_frames: u64,
    /// Estimated sample count, at least 1. Only used for progress.
    pub expected_samples: u64,
}

impl SamplingPlan {
    /// Build a plan aiming at `target_fps` analysed frames per second.
    ///
    /// `native_fps` must already be resolved to a positive value.
    pub fn new(duration_secs: f64, native_fps: f64, target_fps: f64) -> Self {
        let target_fps = if target_fps > 0.0 && target_fps.is_finite() {
            target_fps
        } else {
            DEFAULT_TARGET_FPS
        };
        let duration_secs = if duration_secs.is_finite() && duration_secs > 0.0 {
            duration_secs
        } else {
            0.0
        };

        let frame_step = ((native_fps / target_fps).round() as u64).max(1);
        let sampling_fps = native_fps / frame_step as f64;
        let total_frames = ((duration_secs * native_fps).floor() as u64).max(1);
        let expected_samples = total_frames.div_ceil(frame_step).max(1);

        Self {
            duration_secs,
            native_fps,
            frame_step,
            sampling_fps,
            total_frames,
            expected_samples,
        }
    }

    /// Time covered by one sample, in seconds
    pub fn sample_period(&self) -> f64 {
        if self.sampling_fps > 0.0 {
            1.0 / self.sampling_fps
        } else {
            0.0
        }
    }

    /// Native frame number of the `sample_index`-th sample
    pub fn frame_number(&self, sample_index: u64) -> u64 {
        sample_index.saturating_mul(self.frame_step).min(self.total_frames)
    }

    /// Timestamp (seconds) of the `sample_index`-th sample
    pub fn timestamp(&self, sample_index: u64) -> f64 {
        if self.sampling_fps > 0.0 {
            sample_index as f64 / self.sampling_fps
        } else {
            0.0
        }
    }

    /// Progress percentage after `samples_processed` samples.
    ///
    /// Capped at 99: 100 is reserved for a completed analysis.
    pub fn progress(&self, samples_processed: u64) -> u8 {
        let pct = (samples_processed as f64 / self.expected_samples as f64 * 100.0).round();
        pct.clamp(0.0, 99.0) as u8
    }
}
