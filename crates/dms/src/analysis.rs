//! Per-frame analysis results

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use video_sampler::FrameSample;

use crate::detector::{DetectedFace, LandmarkDetector};
use crate::geometry::{eye_aspect_ratio, mouth_aspect_ratio};
use crate::state::DrowsinessLevel;
use crate::{DmsConfig, DmsError};

/// Eye aspect ratios for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarReading {
    pub left: f64,
    pub right: f64,
    pub average: f64,
}

/// Mouth aspect ratio for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarReading {
    pub ratio: f64,
}

/// Analysis of one frame in which a face was found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetrics {
    pub frame_number: u64,
    /// Seconds from the start of the video
    pub timestamp: f64,
    pub ear: EarReading,
    pub mar: MarReading,
    pub eyes_closed: bool,
    pub yawning: bool,
    pub drowsiness_level: DrowsinessLevel,
    /// Face detection score passed through from the detector
    pub confidence: f32,
}

/// Runs landmark detection on a frame and derives EAR/MAR and drowsiness
pub struct FrameAnalyzer {
    config: DmsConfig,
    detector: Arc<dyn LandmarkDetector>,
}

impl FrameAnalyzer {
    pub fn new(config: DmsConfig, detector: Arc<dyn LandmarkDetector>) -> Self {
        Self { config, detector }
    }

    /// Analyze one sampled frame.
    ///
    /// `Ok(None)` when no face was found or the landmark fit is degenerate;
    /// such frames contribute nothing downstream.
    pub fn analyze(&self, frame: &FrameSample) -> Result<Option<FrameMetrics>, DmsError> {
        let Some(face) = self.detector.detect(frame)? else {
            trace!("No face in frame {}", frame.frame_number);
            counter!("dms_detection_misses_total").increment(1);
            return Ok(None);
        };

        let metrics = self.measure(frame.frame_number, frame.timestamp_secs, &face);
        if metrics.is_none() {
            counter!("dms_degenerate_frames_total").increment(1);
        }
        Ok(metrics)
    }

    /// Compute ratios, flags and level for a detected face
    pub fn measure(&self, frame_number: u64, timestamp: f64, face: &DetectedFace) -> Option<FrameMetrics> {
        let landmarks = &face.landmarks;
        let (Some(left), Some(right), Some(mar)) = (
            eye_aspect_ratio(&landmarks.left_eye),
            eye_aspect_ratio(&landmarks.right_eye),
            mouth_aspect_ratio(&landmarks.mouth),
        ) else {
            debug!("Degenerate landmark geometry in frame {}", frame_number);
            return None;
        };

        let average = (left + right) / 2.0;
        let eyes_closed = average < self.config.eye_ar_threshold;
        let yawning = mar > self.config.mouth_ar_threshold;

        Some(FrameMetrics {
            frame_number,
            timestamp,
            ear: EarReading { left, right, average },
            mar: MarReading { ratio: mar },
            eyes_closed,
            yawning,
            drowsiness_level: DrowsinessLevel::classify(average, mar, eyes_closed, yawning),
            confidence: face.confidence,
        })
    }
}
