//! `ffprobe`/`ffmpeg` backed video source

use std::path::Path;
use std::process::Stdio;

use image::RgbImage;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::probe::parse_probe_output;
use crate::{FrameSample, FrameSource, SamplerConfig, SamplerError, SamplingPlan, VideoInfo, VideoSource};

/// Video source shelling out to the ffmpeg tools
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    config: SamplerConfig,
}

impl FfmpegSource {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new(SamplerConfig::default())
    }
}

impl VideoSource for FfmpegSource {
    type Frames = FfmpegFrames;

    async fn probe(&self, path: &Path) -> Result<VideoInfo, SamplerError> {
        if !path.is_file() {
            return Err(SamplerError::Probe(format!("video file not found: {}", path.display())));
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SamplerError::Probe(format!("failed to run {}: {}", self.config.ffprobe_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SamplerError::Probe(format!(
                "{}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let info = parse_probe_output(&output.stdout, self.config.default_fps)?;
        info!(
            "Probed {}: {}x{} @ {:.2} fps, duration {:.2}s",
            path.display(),
            info.width,
            info.height,
            info.frame_rate,
            info.duration_secs
        );
        Ok(info)
    }

    async fn open(
        &self,
        path: &Path,
        info: &VideoInfo,
        plan: &SamplingPlan,
    ) -> Result<FfmpegFrames, SamplerError> {
        // Scaling to the expected upright size keeps every chunk a whole frame
        let (width, height) = info.output_size();
        let filter = format!(
            "select='not(mod(n\\,{}))',scale={}:{}",
            plan.frame_step, width, height
        );
        let stream = format!("0:{}", info.stream_index);

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", &stream, "-vf", &filter, "-vsync", "vfr"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SamplerError::Decode(format!("failed to run {}: {}", self.config.ffmpeg_path, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SamplerError::Decode("ffmpeg stdout unavailable".into()))?;
        let stderr = child.stderr.take().map(|s| tokio::spawn(collect_stderr(s)));

        debug!("Started ffmpeg decode of {} (every {} frames)", path.display(), plan.frame_step);

        Ok(FfmpegFrames {
            child,
            stdout,
            stderr,
            width,
            height,
            frame_len: width as usize * height as usize * 3,
            plan: *plan,
            next_index: 0,
            finished: false,
        })
    }
}

async fn collect_stderr<R: AsyncRead + Unpin>(mut stderr: R) -> String {
    let mut buf = String::new();
    if let Err(e) = stderr.read_to_string(&mut buf).await {
        warn!("Failed to read ffmpeg stderr: {}", e);
    }
    buf
}

/// Raw `rgb24` frames read one at a time from an ffmpeg pipe
pub struct FfmpegFrames {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frame_len: usize,
    plan: SamplingPlan,
    next_index: u64,
    finished: bool,
}

impl FfmpegFrames {
    /// Reap the child process and turn a failed exit into a decode error
    async fn finish(&mut self) -> Result<(), SamplerError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SamplerError::Decode(format!("failed to wait for ffmpeg: {}", e)))?;

        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            debug!("ffmpeg finished after {} samples", self.next_index);
            Ok(())
        } else {
            Err(SamplerError::Decode(format!("ffmpeg exited with {}: {}", status, stderr.trim())))
        }
    }
}

impl FrameSource for FfmpegFrames {
    async fn next_frame(&mut self) -> Result<Option<FrameSample>, SamplerError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0;
        while filled < self.frame_len {
            let n = self
                .stdout
                .read(&mut buf[filled..])
                .await
                .map_err(|e| SamplerError::Decode(format!("failed to read frame: {}", e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finished = true;
            self.finish().await?;
            return Ok(None);
        }

        if filled < self.frame_len {
            self.finished = true;
            self.finish().await?;
            return Err(SamplerError::Decode(format!(
                "truncated frame after sample {} ({} of {} bytes)",
                self.next_index, filled, self.frame_len
            )));
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| SamplerError::Decode("frame buffer size mismatch".into()))?;

        let index = self.next_index;
        self.next_index += 1;

        Ok(Some(FrameSample::new(
            self.plan.frame_number(index),
            self.plan.timestamp(index),
            index,
            image,
        )))
    }
}
