//! Video capability seams

use std::future::Future;
use std::path::Path;

use crate::{FrameSample, SamplerError, SamplingPlan, VideoInfo};

/// Pull-based stream of sampled frames.
///
/// Yields frames in increasing frame-number order until `Ok(None)`. A stream
/// is single-use: reprocessing a video needs a fresh [`VideoSource::open`].
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<FrameSample>, SamplerError>> + Send;
}

/// Something that can probe and decode video files.
pub trait VideoSource: Send + Sync + 'static {
    type Frames: FrameSource;

    /// Read container metadata
    fn probe(&self, path: &Path) -> impl Future<Output = Result<VideoInfo, SamplerError>> + Send;

    /// Start a decode session emitting every `plan.frame_step`-th frame
    fn open(
        &self,
        path: &Path,
        info: &VideoInfo,
        plan: &SamplingPlan,
    ) -> impl Future<Output = Result<Self::Frames, SamplerError>> + Send;
}
