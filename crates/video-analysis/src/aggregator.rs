//! Session-level aggregation and scoring

use dms::{DrowsinessLevel, FrameMetrics};
use serde::{Deserialize, Serialize};

use crate::segmenter::{DrowsinessEvent, EventType, Severity};
use crate::{round_dp, MetricsConsumer};

/// Average EAR at or above this contributes nothing to the eye score
const EYE_SCORE_REFERENCE: f64 = 0.3;
/// Average MAR at which the mouth score saturates
const MOUTH_SCORE_REFERENCE: f64 = 0.8;

const EYE_WEIGHT: f64 = 0.4;
const MOUTH_WEIGHT: f64 = 0.2;
const CLOSURE_WEIGHT: f64 = 0.4;

/// Session risk bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            75.. => RiskLevel::Critical,
            50..=74 => RiskLevel::High,
            25..=49 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// One timeline point per analysed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Seconds (2 dp)
    pub time: f64,
    /// Average EAR (4 dp)
    pub ear: f64,
    /// MAR (4 dp)
    pub mar: f64,
    pub drowsiness_level: DrowsinessLevel,
}

/// Whole-session drowsiness metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    #[serde(rename = "averageEAR")]
    pub average_ear: f64,
    #[serde(rename = "averageMAR")]
    pub average_mar: f64,
    pub total_eyes_closed_events: u32,
    pub total_yawning_events: u32,
    pub critical_moments: u32,
    /// 0-100
    pub drowsiness_score: u8,
    pub risk_level: RiskLevel,
    /// Seconds (2 dp)
    pub eyes_closed_duration: f64,
    /// Yawning events per hour (2 dp)
    pub yawning_frequency: f64,
}

/// Aggregated output of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// Frames in which a face was analysed
    pub processed_frames: u64,
    pub timeline: Vec<TimelineEntry>,
    pub metrics: SessionMetrics,
}

/// Composite 0-100 drowsiness score.
///
/// Weighted mix of low average EAR, high average MAR and the share of the
/// video spent with eyes closed. A zero duration contributes no closure.
pub fn drowsiness_score(average_ear: f64, average_mar: f64, eyes_closed_secs: f64, duration_secs: f64) -> u8 {
    let eye_score = ((EYE_SCORE_REFERENCE - average_ear) / EYE_SCORE_REFERENCE).clamp(0.0, 1.0);
    let mouth_score = (average_mar / MOUTH_SCORE_REFERENCE).clamp(0.0, 1.0);
    let closure_score = if duration_secs > 0.0 {
        (eyes_closed_secs / duration_secs).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let raw = (eye_score * EYE_WEIGHT + mouth_score * MOUTH_WEIGHT + closure_score * CLOSURE_WEIGHT) * 100.0;
    raw.min(100.0).round() as u8
}

/// Running sums over the analysed frames of one session
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    sample_period: f64,
    valid_samples: u64,
    total_ear: f64,
    total_mar: f64,
    eyes_closed_secs: f64,
    /// Yawning runs started, counted the way the segmenter opens yawn events
    yawn_starts: u32,
    in_yawn: bool,
    timeline: Vec<TimelineEntry>,
}

impl SessionAggregator {
    pub fn new(sample_period: f64) -> Self {
        Self {
            sample_period,
            valid_samples: 0,
            total_ear: 0.0,
            total_mar: 0.0,
            eyes_closed_secs: 0.0,
            yawn_starts: 0,
            in_yawn: false,
            timeline: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: &FrameMetrics) {
        self.valid_samples += 1;
        self.total_ear += frame.ear.average;
        self.total_mar += frame.mar.ratio;
        if frame.eyes_closed {
            self.eyes_closed_secs += self.sample_period;
        }

        // Closed eyes take precedence, so such frames break a yawning run
        let yawn = frame.yawning && !frame.eyes_closed;
        if yawn && !self.in_yawn {
            self.yawn_starts += 1;
        }
        self.in_yawn = yawn;

        self.timeline.push(TimelineEntry {
            time: round_dp(frame.timestamp, 2),
            ear: round_dp(frame.ear.average, 4),
            mar: round_dp(frame.mar.ratio, 4),
            drowsiness_level: frame.drowsiness_level,
        });
    }

    /// Compute the final metrics once the stream has ended.
    ///
    /// `events` are the finalized events of the same session; the event
    /// counts come from them.
    pub fn finish(self, duration_secs: f64, events: &[DrowsinessEvent]) -> SessionSummary {
        let (average_ear, average_mar) = if self.valid_samples > 0 {
            let n = self.valid_samples as f64;
            (self.total_ear / n, self.total_mar / n)
        } else {
            (0.0, 0.0)
        };

        let count = |pred: &dyn Fn(&DrowsinessEvent) -> bool| events.iter().filter(|e| pred(e)).count() as u32;
        let total_eyes_closed_events = count(&|e| e.event_type == EventType::EyesClosed);
        let total_yawning_events = count(&|e| e.event_type == EventType::Yawning);
        let critical_moments = count(&|e| e.severity == Severity::Critical);

        let yawning_frequency = if duration_secs > 0.0 {
            round_dp(self.yawn_starts as f64 / duration_secs * 3600.0, 2)
        } else {
            0.0
        };

        // Without a single analysed face there is nothing to score
        let drowsiness_score = if self.valid_samples > 0 {
            drowsiness_score(average_ear, average_mar, self.eyes_closed_secs, duration_secs)
        } else {
            0
        };

        SessionSummary {
            processed_frames: self.valid_samples,
            timeline: self.timeline,
            metrics: SessionMetrics {
                average_ear,
                average_mar,
                total_eyes_closed_events,
                total_yawning_events,
                critical_moments,
                drowsiness_score,
                risk_level: RiskLevel::from_score(drowsiness_score),
                eyes_closed_duration: round_dp(self.eyes_closed_secs, 2),
                yawning_frequency,
            },
        }
    }
}

impl MetricsConsumer for SessionAggregator {
    fn consume(&mut self, frame: &FrameMetrics) {
        self.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::tests::metrics;
    use crate::segmenter::EventSegmenter;
    use proptest::prelude::*;

    fn summarize(frames: &[FrameMetrics], duration: f64) -> SessionSummary {
        let mut segmenter = EventSegmenter::new(0.2);
        let mut aggregator = SessionAggregator::new(0.2);
        for frame in frames {
            segmenter.push(frame);
            aggregator.push(frame);
        }
        let events = segmenter.finish();
        aggregator.finish(duration, &events)
    }

    #[test]
    fn test_risk_buckets() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(24), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(74), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn test_score_components() {
        assert_eq!(drowsiness_score(0.35, 0.0, 0.0, 10.0), 0);
        assert_eq!(drowsiness_score(0.0, 0.8, 10.0, 10.0), 100);
        // Eye score only: (0.3 - 0.15) / 0.3 * 0.4
        assert_eq!(drowsiness_score(0.15, 0.0, 0.0, 10.0), 20);
        // Closure saturates
        assert_eq!(drowsiness_score(0.35, 0.0, 30.0, 10.0), 40);
    }

    #[test]
    fn test_zero_duration_guard() {
        let frames = vec![metrics(0, 0.35, 0.8)];
        let summary = summarize(&frames, 0.0);

        assert_eq!(summary.metrics.yawning_frequency, 0.0);
        assert_eq!(summary.metrics.total_yawning_events, 1);
        assert_eq!(drowsiness_score(0.35, 0.0, 5.0, 0.0), 0);
    }

    #[test]
    fn test_empty_session() {
        let summary = summarize(&[], 10.0);

        assert_eq!(summary.processed_frames, 0);
        assert_eq!(summary.metrics.average_ear, 0.0);
        assert_eq!(summary.metrics.average_mar, 0.0);
        // A zero EAR average here must not read as closed eyes
        assert_eq!(summary.metrics.drowsiness_score, 0);
        assert_eq!(summary.metrics.risk_level, RiskLevel::Low);
        assert!(summary.timeline.is_empty());
    }

    #[test]
    fn test_yawning_session() {
        // 2 yawns of 1s in a 60s clip
        let mut frames = Vec::new();
        for i in 0..10u64 {
            let mar = if i < 5 { 0.8 } else { 0.2 };
            frames.push(metrics(i, 0.35, mar));
        }
        for i in 10..15u64 {
            frames.push(metrics(i, 0.35, 0.8));
        }
        let summary = summarize(&frames, 60.0);

        assert_eq!(summary.metrics.total_yawning_events, 2);
        assert_eq!(summary.metrics.total_eyes_closed_events, 0);
        assert_eq!(summary.metrics.yawning_frequency, 120.0);
        assert_eq!(summary.metrics.eyes_closed_duration, 0.0);
        assert_eq!(summary.timeline.len(), 15);
        assert_eq!(summary.timeline[3].mar, 0.8);
        assert_eq!(summary.timeline[3].time, 0.6);
    }

    #[test]
    fn test_yawn_runs_split_by_closed_eyes() {
        // yawn, yawn with eyes shut, yawn again, then a pause and one more yawn
        let frames = vec![
            metrics(0, 0.35, 0.8),
            metrics(1, 0.15, 0.8),
            metrics(2, 0.35, 0.8),
            metrics(3, 0.35, 0.2),
            metrics(4, 0.35, 0.8),
        ];
        let summary = summarize(&frames, 3600.0);

        assert_eq!(summary.metrics.total_yawning_events, 3);
        assert_eq!(summary.metrics.yawning_frequency, 3.0);
    }

    #[test]
    fn test_critical_moments_and_closure() {
        let frames: Vec<_> = (0..10).map(|i| metrics(i, if i % 2 == 0 { 0.15 } else { 0.35 }, 0.1)).collect();
        let summary = summarize(&frames, 2.0);

        assert_eq!(summary.metrics.total_eyes_closed_events, 5);
        assert_eq!(summary.metrics.critical_moments, 5);
        assert_eq!(summary.metrics.eyes_closed_duration, 1.0);
        assert!((summary.metrics.average_ear - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_serialize_with_legacy_names() {
        let summary = summarize(&[metrics(0, 0.15, 0.1)], 1.0);
        let json = serde_json::to_value(&summary.metrics).unwrap();

        assert!(json.get("averageEAR").is_some());
        assert!(json.get("averageMAR").is_some());
        assert_eq!(json["riskLevel"], "medium");
        assert!(json.get("eyesClosedDuration").is_some());
    }

    proptest! {
        #[test]
        fn prop_score_monotonic_in_closure(
            ear in 0.0f64..0.5,
            mar in 0.0f64..1.2,
            duration in 0.1f64..3600.0,
            closed in 0.0f64..3600.0,
            extra in 0.0f64..600.0,
        ) {
            let base = drowsiness_score(ear, mar, closed, duration);
            let more = drowsiness_score(ear, mar, closed + extra, duration);
            prop_assert!(more >= base);
            prop_assert!(more <= 100);
        }
    }
}
