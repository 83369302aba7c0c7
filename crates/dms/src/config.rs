//! DMS configuration

use serde::{Deserialize, Serialize};

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// EAR below this marks the eyes as closed
    pub eye_ar_threshold: f64,

    /// MAR above this marks the mouth as yawning
    pub mouth_ar_threshold: f64,

    /// Face detection confidence threshold
    pub face_confidence: f32,

    /// Face detector model (UltraFace-style `scores`/`boxes` outputs)
    pub face_model_path: Option<String>,

    /// 68-point landmark regressor model
    pub landmark_model_path: Option<String>,

    /// Intra-op threads per ONNX session
    pub intra_threads: usize,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            eye_ar_threshold: 0.30,
            mouth_ar_threshold: 0.6,
            face_confidence: 0.5,
            face_model_path: Some("models/face_detector.onnx".to_string()),
            landmark_model_path: Some("models/face_landmarks_68.onnx".to_string()),
            intra_threads: 1,
        }
    }
}
