//! End-to-end offline analysis of one video

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dms::FrameAnalyzer;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};
use video_sampler::{FrameSource, SamplingPlan, VideoSource, DEFAULT_TARGET_FPS};

use crate::aggregator::SessionAggregator;
use crate::progress::{CancelFlag, ProgressBus};
use crate::result::{AnalysisResult, ResultStatus};
use crate::segmenter::EventSegmenter;
use crate::{AnalysisError, MetricsConsumer};

/// Probe → decode → analyze → segment/aggregate, for one video at a time.
///
/// Holds no per-run state: one pipeline can serve concurrent runs on
/// different videos.
pub struct AnalysisPipeline<V: VideoSource> {
    source: V,
    analyzer: Arc<FrameAnalyzer>,
    target_fps: f64,
}

impl<V: VideoSource> AnalysisPipeline<V> {
    pub fn new(source: V, analyzer: Arc<FrameAnalyzer>) -> Self {
        Self {
            source,
            analyzer,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }

    /// Analysed frames per second to aim for
    pub fn with_target_fps(mut self, target_fps: f64) -> Self {
        self.target_fps = target_fps;
        self
    }

    /// Analyze the video at `path`.
    ///
    /// Progress below 100 is published after every sample and 100 once the
    /// result is ready. On error nothing partial is returned.
    pub async fn run(
        &self,
        video_id: &str,
        path: &Path,
        progress: &ProgressBus,
        cancel: &CancelFlag,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();

        let info = self.source.probe(path).await?;
        let plan = SamplingPlan::new(info.duration_secs, info.frame_rate, self.target_fps);
        info!(
            "Analyzing {}: {:.2}s @ {:.2} fps, every {} frames (~{} samples)",
            video_id, plan.duration_secs, plan.native_fps, plan.frame_step, plan.expected_samples
        );

        let mut frames = self.source.open(path, &info, &plan).await?;
        let mut segmenter = EventSegmenter::new(plan.sample_period());
        let mut aggregator = SessionAggregator::new(plan.sample_period());
        let mut samples: u64 = 0;
        let mut last_progress = None;

        loop {
            if cancel.is_cancelled() {
                info!("Analysis of {} cancelled after {} samples", video_id, samples);
                return Err(AnalysisError::Cancelled);
            }

            let Some(frame) = frames.next_frame().await? else {
                break;
            };
            counter!("analysis_frames_sampled_total").increment(1);

            let analyzer = Arc::clone(&self.analyzer);
            let frame_number = frame.frame_number;
            let outcome = tokio::task::spawn_blocking(move || analyzer.analyze(&frame))
                .await
                .map_err(|e| AnalysisError::Worker(e.to_string()))?;

            match outcome {
                Ok(Some(metrics)) => {
                    counter!("analysis_frames_analyzed_total").increment(1);
                    let consumers: [&mut dyn MetricsConsumer; 2] = [&mut segmenter, &mut aggregator];
                    for consumer in consumers {
                        consumer.consume(&metrics);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping frame {} of {}: {}", frame_number, video_id, e);
                    counter!("analysis_frame_errors_total").increment(1);
                }
            }

            samples += 1;
            let pct = plan.progress(samples);
            if last_progress != Some(pct) {
                progress.report(pct);
                last_progress = Some(pct);
            }
        }

        let events = segmenter.finish();
        let summary = aggregator.finish(plan.duration_secs, &events);
        debug!(
            "{}: {} samples, {} with a face, {} events",
            video_id,
            samples,
            summary.processed_frames,
            events.len()
        );

        let result = AnalysisResult {
            id: video_id.to_string(),
            duration: plan.duration_secs,
            total_frames: plan.total_frames,
            processed_frames: summary.processed_frames,
            events,
            timeline: summary.timeline,
            metrics: summary.metrics,
            status: ResultStatus::Completed,
            completed_at: Utc::now(),
        };

        histogram!("analysis_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            "Analysis of {} completed: score {} ({:?})",
            video_id, result.metrics.drowsiness_score, result.metrics.risk_level
        );
        progress.report(100);

        Ok(result)
    }
}
