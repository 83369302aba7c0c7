//! Driver Monitoring System (DMS)
//!
//! Per-frame driver state analysis from facial landmarks:
//! - Face and 68-point landmark detection (ONNX)
//! - Eye Aspect Ratio (EAR) for eye closure
//! - Mouth Aspect Ratio (MAR) for yawning
//! - 5-level per-frame drowsiness classification

pub mod analysis;
pub mod config;
pub mod detector;
pub mod geometry;
pub mod scripted;
pub mod state;

pub use analysis::{EarReading, FrameAnalyzer, FrameMetrics, MarReading};
pub use config::DmsConfig;
pub use detector::{DetectedFace, FaceLandmarks, LandmarkDetector, OnnxLandmarkDetector};
pub use geometry::{euclidean_distance, eye_aspect_ratio, mouth_aspect_ratio, LandmarkPoint};
pub use scripted::ScriptedDetector;
pub use state::DrowsinessLevel;

use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
