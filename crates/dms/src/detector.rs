//! Face landmark detection

use std::sync::Arc;

use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};
use video_sampler::FrameSample;

use crate::geometry::LandmarkPoint;
use crate::{DmsConfig, DmsError};

/// Number of points in the iBUG-68 layout
pub const IBUG68_POINTS: usize = 68;

const LEFT_EYE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE: std::ops::Range<usize> = 42..48;
const MOUTH: std::ops::Range<usize> = 48..68;

/// Face detector input size (width, height)
const DETECTOR_INPUT: (u32, u32) = (320, 240);
/// Landmark regressor input side
const LANDMARK_INPUT: u32 = 112;
/// Margin added around the detected box before landmarking
const CROP_MARGIN: f32 = 1.2;

/// Landmark groups used by the aspect-ratio formulas.
///
/// Point order is fixed by the iBUG-68 layout; reordering corrupts EAR/MAR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: [LandmarkPoint; 6],
    pub right_eye: [LandmarkPoint; 6],
    /// 20-point mouth ring: 12 outer-lip points then 8 inner-lip points
    pub mouth: Vec<LandmarkPoint>,
}

impl FaceLandmarks {
    /// Split a full 68-point face into the groups used for EAR/MAR
    pub fn from_ibug68(points: &[LandmarkPoint]) -> Result<Self, DmsError> {
        if points.len() != IBUG68_POINTS {
            return Err(DmsError::Inference(format!(
                "expected {} landmarks, got {}",
                IBUG68_POINTS,
                points.len()
            )));
        }

        let group = |range: std::ops::Range<usize>| -> [LandmarkPoint; 6] {
            let mut out = [LandmarkPoint::default(); 6];
            out.copy_from_slice(&points[range]);
            out
        };

        Ok(Self {
            left_eye: group(LEFT_EYE),
            right_eye: group(RIGHT_EYE),
            mouth: points[MOUTH].to_vec(),
        })
    }
}

/// A single detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub landmarks: FaceLandmarks,
    /// Face detection score (0-1)
    pub confidence: f32,
}

/// Face landmark capability: zero or one face per frame.
///
/// Implementations are shared read-only across concurrent analyses.
pub trait LandmarkDetector: Send + Sync {
    /// `Ok(None)` means no face was found, which is not an error
    fn detect(&self, frame: &FrameSample) -> Result<Option<DetectedFace>, DmsError>;
}

/// Face box in source-image pixels
#[derive(Debug, Clone, Copy)]
struct FaceBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    score: f32,
}

static SHARED_MODELS: OnceCell<Arc<OnnxLandmarkDetector>> = OnceCell::const_new();

/// Two-stage ONNX detector: face box, then 68 landmarks inside the box
pub struct OnnxLandmarkDetector {
    face_session: Session,
    landmark_session: Session,
    confidence_threshold: f32,
}

impl OnnxLandmarkDetector {
    /// Load both models from disk
    pub fn load(config: &DmsConfig) -> Result<Self, DmsError> {
        let face_path = config
            .face_model_path
            .as_deref()
            .ok_or_else(|| DmsError::Config("face_model_path is not set".into()))?;
        let landmark_path = config
            .landmark_model_path
            .as_deref()
            .ok_or_else(|| DmsError::Config("landmark_model_path is not set".into()))?;

        Ok(Self {
            face_session: load_session(face_path, config.intra_threads)?,
            landmark_session: load_session(landmark_path, config.intra_threads)?,
            confidence_threshold: config.face_confidence,
        })
    }

    /// Process-wide instance, loaded on first call.
    ///
    /// Later calls return the same models whatever `config` they pass.
    pub async fn shared(config: &DmsConfig) -> Result<Arc<Self>, DmsError> {
        SHARED_MODELS
            .get_or_try_init(|| async { Self::load(config).map(Arc::new) })
            .await
            .cloned()
    }

    fn detect_face(&self, frame: &FrameSample) -> Result<Option<FaceBox>, DmsError> {
        let (in_w, in_h) = DETECTOR_INPUT;
        let resized = imageops::resize(&frame.image, in_w, in_h, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, in_h as usize, in_w as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - 127.0) / 128.0;
            }
        }

        let tensor = Tensor::from_array(input).map_err(|e| DmsError::Inference(e.to_string()))?;
        let inputs = ort::inputs!["input" => tensor].map_err(|e| DmsError::Inference(e.to_string()))?;
        let outputs = self
            .face_session
            .run(inputs)
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let scores: Vec<f32> = outputs["scores"]
            .try_extract_tensor::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();
        let boxes: Vec<f32> = outputs["boxes"]
            .try_extract_tensor::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        // scores: [1, N, 2] (background, face); boxes: [1, N, 4] normalized corners
        let best = scores
            .chunks_exact(2)
            .map(|s| s[1])
            .enumerate()
            .filter(|(_, score)| score.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let Some((idx, score)) = best else {
            return Ok(None);
        };
        if score < self.confidence_threshold {
            debug!("Best face score {:.3} below threshold", score);
            return Ok(None);
        }

        let corners = boxes
            .get(idx * 4..idx * 4 + 4)
            .ok_or_else(|| DmsError::Inference("face box index out of range".into()))?;
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let (x1, y1) = (corners[0].clamp(0.0, 1.0) * w, corners[1].clamp(0.0, 1.0) * h);
        let (x2, y2) = (corners[2].clamp(0.0, 1.0) * w, corners[3].clamp(0.0, 1.0) * h);

        Ok(Some(FaceBox {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
            score,
        }))
    }

    fn landmarks(&self, frame: &FrameSample, face: &FaceBox) -> Result<Option<Vec<LandmarkPoint>>, DmsError> {
        // Square crop around the box centre
        let side = face.width.max(face.height) * CROP_MARGIN;
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;
        let left = (cx - side / 2.0).max(0.0);
        let top = (cy - side / 2.0).max(0.0);

        let Some(crop) = frame.crop(left as u32, top as u32, side.ceil() as u32, side.ceil() as u32) else {
            return Ok(None);
        };
        let (crop_w, crop_h) = (crop.width() as f64, crop.height() as f64);

        let resized = imageops::resize(&crop, LANDMARK_INPUT, LANDMARK_INPUT, FilterType::Triangle);
        let side_px = LANDMARK_INPUT as usize;
        let mut input = Array4::<f32>::zeros((1, 3, side_px, side_px));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        let tensor = Tensor::from_array(input).map_err(|e| DmsError::Inference(e.to_string()))?;
        let inputs = ort::inputs![tensor].map_err(|e| DmsError::Inference(e.to_string()))?;
        let outputs = self
            .landmark_session
            .run(inputs)
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let coords: Vec<f32> = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        if coords.len() < IBUG68_POINTS * 2 {
            return Err(DmsError::Inference(format!(
                "landmark output too short: {} values",
                coords.len()
            )));
        }

        // Normalized to the crop
        let (left, top) = (left.floor() as f64, top.floor() as f64);
        let points = coords[..IBUG68_POINTS * 2]
            .chunks_exact(2)
            .map(|xy| LandmarkPoint::new(left + xy[0] as f64 * crop_w, top + xy[1] as f64 * crop_h))
            .collect();

        Ok(Some(points))
    }
}

impl LandmarkDetector for OnnxLandmarkDetector {
    fn detect(&self, frame: &FrameSample) -> Result<Option<DetectedFace>, DmsError> {
        let Some(face) = self.detect_face(frame)? else {
            return Ok(None);
        };
        let Some(points) = self.landmarks(frame, &face)? else {
            return Ok(None);
        };

        Ok(Some(DetectedFace {
            landmarks: FaceLandmarks::from_ibug68(&points)?,
            confidence: face.score,
        }))
    }
}

fn load_session(path: &str, threads: usize) -> Result<Session, DmsError> {
    info!("Loading model from {}", path);
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.with_intra_threads(threads.max(1)))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| {
            error!("Failed to load model {}: {}", path, e);
            DmsError::ModelLoad(format!("{}: {}", path, e))
        })
}
