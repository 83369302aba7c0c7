//! Offline Drowsiness Analysis
//!
//! Consumes the ordered per-frame metrics of one video:
//! - Event segmentation (eyes-closed / yawning runs)
//! - Session aggregation (averages, closure time, 0-100 score, risk level)
//! - Pipeline driving sampler → analyzer → both consumers
//! - Progress fan-out and cooperative cancellation

pub mod aggregator;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod segmenter;

pub use aggregator::{drowsiness_score, RiskLevel, SessionAggregator, SessionMetrics, SessionSummary, TimelineEntry};
pub use pipeline::AnalysisPipeline;
pub use progress::{CancelFlag, ProgressBus};
pub use result::{AnalysisResult, ResultStatus};
pub use segmenter::{DrowsinessEvent, EventSegmenter, EventType, Severity};

use dms::FrameMetrics;
use thiserror::Error;
use video_sampler::SamplerError;

/// Analysis error types
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Frame analysis task failed: {0}")]
    Worker(String),
}

/// A consumer of the ordered per-frame metrics stream
pub trait MetricsConsumer {
    fn consume(&mut self, frame: &FrameMetrics);
}

/// Round half away from zero to `decimals` places
pub(crate) fn round_dp(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_dp() {
        assert_eq!(round_dp(1.005_1, 2), 1.01);
        assert_eq!(round_dp(0.123_449, 4), 0.1234);
        assert_eq!(round_dp(9.999, 2), 10.0);
        assert_eq!(round_dp(0.0, 2), 0.0);
    }
}
