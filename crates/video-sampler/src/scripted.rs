//! Scripted video source
//!
//! Replays a fixed-length session of blank frames without touching the
//! filesystem. Paired with a scripted landmark detector it drives the whole
//! analysis pipeline deterministically.

use std::path::Path;
use std::time::Duration;

use image::RgbImage;

use crate::{FrameSample, FrameSource, SamplerError, SamplingPlan, VideoInfo, VideoSource};

/// Video source producing blank frames for a declared duration and rate
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    info: VideoInfo,
    probe_error: Option<String>,
    decode_error_at: Option<u64>,
    frame_delay: Option<Duration>,
}

impl ScriptedSource {
    /// A session of `duration_secs` seconds at `frame_rate` fps
    pub fn new(duration_secs: f64, frame_rate: f64) -> Self {
        Self {
            info: VideoInfo {
                duration_secs,
                frame_rate,
                width: 4,
                height: 4,
                stream_index: 0,
                rotation: 0,
            },
            probe_error: None,
            decode_error_at: None,
            frame_delay: None,
        }
    }

    /// Fail every probe with `message`
    pub fn with_probe_error(mut self, message: impl Into<String>) -> Self {
        self.probe_error = Some(message.into());
        self
    }

    /// Fail decoding when sample `sample_index` is requested
    pub fn with_decode_error_at(mut self, sample_index: u64) -> Self {
        self.decode_error_at = Some(sample_index);
        self
    }

    /// Sleep before every frame, to keep a session running for a while
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }
}

impl VideoSource for ScriptedSource {
    type Frames = ScriptedFrames;

    async fn probe(&self, _path: &Path) -> Result<VideoInfo, SamplerError> {
        match &self.probe_error {
            Some(message) => Err(SamplerError::Probe(message.clone())),
            None => Ok(self.info),
        }
    }

    async fn open(
        &self,
        _path: &Path,
        info: &VideoInfo,
        plan: &SamplingPlan,
    ) -> Result<ScriptedFrames, SamplerError> {
        Ok(ScriptedFrames {
            plan: *plan,
            width: info.width,
            height: info.height,
            next_index: 0,
            decode_error_at: self.decode_error_at,
            frame_delay: self.frame_delay,
        })
    }
}

/// Frames of a [`ScriptedSource`] session: one per expected sample
#[derive(Debug)]
pub struct ScriptedFrames {
    plan: SamplingPlan,
    width: u32,
    height: u32,
    next_index: u64,
    decode_error_at: Option<u64>,
    frame_delay: Option<Duration>,
}

impl FrameSource for ScriptedFrames {
    async fn next_frame(&mut self) -> Result<Option<FrameSample>, SamplerError> {
        if self.next_index >= self.plan.expected_samples {
            return Ok(None);
        }
        if self.decode_error_at == Some(self.next_index) {
            return Err(SamplerError::Decode(format!(
                "corrupt packet at sample {}",
                self.next_index
            )));
        }
        if let Some(delay) = self.frame_delay {
            tokio::time::sleep(delay).await;
        }

        let index = self.next_index;
        self.next_index += 1;

        Ok(Some(FrameSample::new(
            self.plan.frame_number(index),
            self.plan.timestamp(index),
            index,
            RgbImage::new(self.width, self.height),
        )))
    }
}
