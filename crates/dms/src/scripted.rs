//! Scripted landmark detector
//!
//! Synthesizes landmark sets with chosen EAR/MAR values so the pipeline can
//! be replayed without model files.

use video_sampler::FrameSample;

use crate::detector::{DetectedFace, FaceLandmarks, LandmarkDetector};
use crate::geometry::LandmarkPoint;
use crate::DmsError;

const EYE_WIDTH: f64 = 30.0;
const MOUTH_WIDTH: f64 = 40.0;
const SCRIPTED_CONFIDENCE: f32 = 0.95;

type Script = dyn Fn(&FrameSample) -> Result<Option<(f64, f64)>, DmsError> + Send + Sync;

/// Detector driven by a function of the frame returning `(ear, mar)`
pub struct ScriptedDetector {
    script: Box<Script>,
}

impl ScriptedDetector {
    /// `f` returns `Some((ear, mar))` for a face, `None` for no face
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&FrameSample) -> Option<(f64, f64)> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(move |frame| Ok(f(frame))),
        }
    }

    /// Same face on every frame
    pub fn constant(ear: f64, mar: f64) -> Self {
        Self::from_fn(move |_| Some((ear, mar)))
    }

    /// Never finds a face
    pub fn no_face() -> Self {
        Self::from_fn(|_| None)
    }

    /// Fails inference on every frame
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            script: Box::new(move |_| Err(DmsError::Inference(message.clone()))),
        }
    }
}

impl LandmarkDetector for ScriptedDetector {
    fn detect(&self, frame: &FrameSample) -> Result<Option<DetectedFace>, DmsError> {
        Ok((self.script)(frame)?.map(|(ear, mar)| synthetic_face(ear, mar)))
    }
}

/// Build a face whose eyes have aspect ratio `ear` and mouth `mar`
pub fn synthetic_face(ear: f64, mar: f64) -> DetectedFace {
    DetectedFace {
        landmarks: FaceLandmarks {
            left_eye: synthetic_eye(100.0, ear),
            right_eye: synthetic_eye(160.0, ear),
            mouth: synthetic_mouth(mar),
        },
        confidence: SCRIPTED_CONFIDENCE,
    }
}

fn synthetic_eye(left: f64, ear: f64) -> [LandmarkPoint; 6] {
    // EAR = 4h / 2w for lids at +-h
    let h = ear * EYE_WIDTH / 2.0;
    let (y, w) = (100.0, EYE_WIDTH);
    [
        LandmarkPoint::new(left, y),
        LandmarkPoint::new(left + w / 3.0, y - h),
        LandmarkPoint::new(left + 2.0 * w / 3.0, y - h),
        LandmarkPoint::new(left + w, y),
        LandmarkPoint::new(left + 2.0 * w / 3.0, y + h),
        LandmarkPoint::new(left + w / 3.0, y + h),
    ]
}

fn synthetic_mouth(mar: f64) -> Vec<LandmarkPoint> {
    // MAR = 4v / 2w for lips at +-v
    let v = mar * MOUTH_WIDTH / 2.0;
    let (cx, cy, w) = (150.0, 200.0, MOUTH_WIDTH);
    let left = cx - w / 2.0;

    let mut mouth = vec![LandmarkPoint::new(cx, cy); 20];
    for (i, point) in mouth.iter_mut().enumerate().take(12) {
        // Outer ring: 0 left corner, 1-5 upper lip, 6 right corner, 7-11 lower lip
        let (x, y) = match i {
            0 => (left, cy),
            6 => (left + w, cy),
            1..=5 => (left + w * i as f64 / 6.0, cy - v),
            _ => (left + w * (12 - i) as f64 / 6.0, cy + v),
        };
        *point = LandmarkPoint::new(x, y);
    }
    for (i, point) in mouth.iter_mut().enumerate().skip(12) {
        let t = (i - 12) as f64 / 8.0;
        *point = LandmarkPoint::new(left + w * 0.25 + w * 0.5 * t, cy);
    }
    mouth
}
