//! Video Sampler
//!
//! Turns a video file into an ordered, pull-based stream of sampled frames:
//! - Container probing (duration, native frame rate, frame size)
//! - Decimation plan targeting ~5 analysed frames per second
//! - `ffmpeg` decode pipe yielding one RGB frame at a time
//! - Scripted source for replaying synthetic sessions

pub mod ffmpeg;
pub mod frame;
pub mod plan;
pub mod probe;
pub mod scripted;
pub mod source;

pub use ffmpeg::{FfmpegFrames, FfmpegSource};
pub use frame::FrameSample;
pub use plan::SamplingPlan;
pub use probe::{parse_frame_rate, VideoInfo};
pub use scripted::{ScriptedFrames, ScriptedSource};
pub use source::{FrameSource, VideoSource};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame rate assumed when the container does not report a usable one
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

/// Number of frames per second the analysis pipeline aims to look at
pub const DEFAULT_TARGET_FPS: f64 = 5.0;

/// Sampler error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    /// The container could not be read or lacks video stream metadata
    #[error("Failed to probe video: {0}")]
    Probe(String),

    /// Decoding failed after the stream had started
    #[error("Failed to decode video: {0}")]
    Decode(String),
}

/// Sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Analysed frames per second to aim for
    pub target_fps: f64,
    /// Fallback when the probed frame rate is missing or invalid
    pub default_fps: f64,
    /// `ffprobe` executable
    pub ffprobe_path: String,
    /// `ffmpeg` executable
    pub ffmpeg_path: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            default_fps: DEFAULT_FRAME_RATE,
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}
