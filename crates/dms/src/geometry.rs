//! Landmark geometry: distances and aspect ratios

use serde::{Deserialize, Serialize};

/// Denominators shorter than this are treated as a failed landmark fit
const MIN_SPAN: f64 = 1e-6;

/// 2D landmark position in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

impl LandmarkPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Straight-line distance between two points
pub fn euclidean_distance(p1: &LandmarkPoint, p2: &LandmarkPoint) -> f64 {
    ((p1.x - p2.x).powi(2) + (p1.y - p2.y).powi(2)).sqrt()
}

/// Eye Aspect Ratio over a 6-point eye contour.
///
/// Points follow the iBUG-68 order: `p0`/`p3` are the corners, `p1`,`p2` the
/// upper lid and `p5`,`p4` the lower lid.
///
/// EAR = (|p1-p5| + |p2-p4|) / (2 * |p0-p3|)
///
/// Returns `None` when the eye width is (near) zero.
pub fn eye_aspect_ratio(eye: &[LandmarkPoint; 6]) -> Option<f64> {
    let a = euclidean_distance(&eye[1], &eye[5]);
    let b = euclidean_distance(&eye[2], &eye[4]);
    let c = euclidean_distance(&eye[0], &eye[3]);
    ratio(a + b, 2.0 * c)
}

/// Mouth Aspect Ratio over the outer-lip ring.
///
/// Uses the first 12 mouth points (iBUG-68 points 48-59): corners at
/// positions 0 and 6, vertical pairs (2,10) and (4,8).
///
/// MAR = (|m2-m10| + |m4-m8|) / (2 * |m0-m6|)
///
/// Returns `None` for fewer than 12 points or a (near) zero mouth width.
pub fn mouth_aspect_ratio(mouth: &[LandmarkPoint]) -> Option<f64> {
    if mouth.len() < 12 {
        return None;
    }
    let a = euclidean_distance(&mouth[2], &mouth[10]);
    let b = euclidean_distance(&mouth[4], &mouth[8]);
    let c = euclidean_distance(&mouth[0], &mouth[6]);
    ratio(a + b, 2.0 * c)
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if !denominator.is_finite() || denominator < MIN_SPAN {
        return None;
    }
    let value = numerator / denominator;
    value.is_finite().then_some(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Eye `width` wide with both lids `half_open` away from the corner line
    pub(crate) fn eye(width: f64, half_open: f64) -> [LandmarkPoint; 6] {
        [
            LandmarkPoint::new(0.0, 0.0),
            LandmarkPoint::new(width / 3.0, -half_open),
            LandmarkPoint::new(2.0 * width / 3.0, -half_open),
            LandmarkPoint::new(width, 0.0),
            LandmarkPoint::new(2.0 * width / 3.0, half_open),
            LandmarkPoint::new(width / 3.0, half_open),
        ]
    }

    #[test]
    fn test_euclidean_distance() {
        let d = euclidean_distance(&LandmarkPoint::new(1.0, 2.0), &LandmarkPoint::new(4.0, 6.0));
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_open_and_closed_eye() {
        // EAR = 4h / 2w
        let open = eye_aspect_ratio(&eye(30.0, 5.0)).unwrap();
        let closed = eye_aspect_ratio(&eye(30.0, 1.5)).unwrap();

        assert!((open - 1.0 / 3.0).abs() < 1e-9);
        assert!((closed - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_eye() {
        let collapsed = [LandmarkPoint::new(3.0, 3.0); 6];
        assert_eq!(eye_aspect_ratio(&collapsed), None);
    }

    #[test]
    fn test_mouth_aspect_ratio() {
        let mut mouth = vec![LandmarkPoint::default(); 20];
        mouth[0] = LandmarkPoint::new(0.0, 0.0);
        mouth[6] = LandmarkPoint::new(40.0, 0.0);
        mouth[2] = LandmarkPoint::new(13.0, -10.0);
        mouth[10] = LandmarkPoint::new(13.0, 10.0);
        mouth[4] = LandmarkPoint::new(27.0, -10.0);
        mouth[8] = LandmarkPoint::new(27.0, 10.0);

        let mar = mouth_aspect_ratio(&mouth).unwrap();
        assert!((mar - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_mouth_too_few_points() {
        assert_eq!(mouth_aspect_ratio(&[LandmarkPoint::new(1.0, 1.0); 8]), None);
    }

    #[test]
    fn test_degenerate_mouth() {
        assert_eq!(mouth_aspect_ratio(&[LandmarkPoint::new(5.0, 5.0); 20]), None);
    }

    proptest! {
        #[test]
        fn prop_ear_positive_and_finite(width in 1.0f64..200.0, half_open in 0.01f64..50.0) {
            let ear = eye_aspect_ratio(&eye(width, half_open)).unwrap();
            prop_assert!(ear.is_finite());
            prop_assert!(ear > 0.0);
        }

        #[test]
        fn prop_ear_decreases_as_eye_closes(
            width in 1.0f64..200.0,
            half_open in 0.02f64..50.0,
            shrink in 0.01f64..0.99,
        ) {
            let wide = eye_aspect_ratio(&eye(width, half_open)).unwrap();
            let narrower = eye_aspect_ratio(&eye(width, half_open * shrink)).unwrap();
            prop_assert!(narrower < wide);
        }
    }
}
