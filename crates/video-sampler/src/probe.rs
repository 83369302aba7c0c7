//! Container metadata from `ffprobe`

use crate::SamplerError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Probed video metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds (0 when the container does not report one)
    pub duration_secs: f64,
    /// Native frame rate, always positive
    pub frame_rate: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Container index of the analysed stream
    #[serde(default)]
    pub stream_index: u32,
    /// Display rotation in degrees, as tagged by the recorder
    #[serde(default)]
    pub rotation: i32,
}

impl VideoInfo {
    /// Size of the upright frames the decoder emits.
    ///
    /// Decoders apply the display rotation, so 90/270 degree clips come out
    /// with width and height swapped.
    pub fn output_size(&self) -> (u32, u32) {
        if self.rotation.rem_euclid(180) == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// `ffprobe -print_format json -show_format -show_streams` output
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    index: Option<u32>,
    codec_type: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    time_base: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    disposition: ProbeDisposition,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Cover art and thumbnails are tagged as video streams too
    fn is_motion_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video") && self.disposition.attached_pic == 0
    }

    /// Rotation from the display matrix, else the legacy `rotate` tag
    fn rotation(&self) -> i32 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .map(|deg: f64| deg.round() as i32)
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse a frame rate expressed as a number or a `num/den` rational.
///
/// Returns `None` for missing, zero, negative, or unparseable input.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let value = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };

    (value.is_finite() && value > 0.0).then_some(value)
}

/// Pick the first usable frame rate: average, then real base rate, then the
/// inverse of the stream time base.
fn resolve_frame_rate(stream: &ProbeStream, default_fps: f64) -> f64 {
    let candidates = [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()];
    if let Some(fps) = candidates.into_iter().flatten().find_map(parse_frame_rate) {
        return fps;
    }

    if let Some(fps) = stream
        .time_base
        .as_deref()
        .and_then(parse_frame_rate)
        .map(|tb| 1.0 / tb)
        .filter(|fps| fps.is_finite() && *fps > 0.0)
    {
        return fps;
    }

    debug!("No usable frame rate in stream metadata, assuming {} fps", default_fps);
    default_fps
}

/// Parse raw `ffprobe` JSON into [`VideoInfo`].
pub fn parse_probe_output(raw: &[u8], default_fps: f64) -> Result<VideoInfo, SamplerError> {
    let output: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|e| SamplerError::Probe(format!("unreadable ffprobe output: {}", e)))?;

    let (position, stream) = output
        .streams
        .iter()
        .enumerate()
        .find(|(_, s)| s.is_motion_video())
        .ok_or_else(|| SamplerError::Probe("no video stream found".into()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(SamplerError::Probe("video stream has no frame size".into())),
    };

    let duration_secs = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    Ok(VideoInfo {
        duration_secs,
        frame_rate: resolve_frame_rate(stream, default_fps),
        width,
        height,
        stream_index: stream.index.unwrap_or(position as u32),
        rotation: stream.rotation(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rational_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_plain_frame_rate() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate(" 59.94 "), Some(59.94));
    }

    #[test]
    fn test_parse_invalid_frame_rate() {
        assert_eq!(parse_frame_rate(""), None);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("-25"), None);
        assert_eq!(parse_frame_rate("abc"), None);
        assert_eq!(parse_frame_rate("x/2"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let raw = br#"{
            "streams": [
                {"codec_type": "audio", "avg_frame_rate": "0/0"},
                {"codec_type": "video", "avg_frame_rate": "30/1", "r_frame_rate": "30/1",
                 "time_base": "1/15360", "width": 640, "height": 480}
            ],
            "format": {"duration": "10.000000"}
        }"#;

        let info = parse_probe_output(raw, 25.0).unwrap();
        assert_eq!(info.frame_rate, 30.0);
        assert_eq!(info.duration_secs, 10.0);
        assert_eq!((info.width, info.height), (640, 480));
    }

    #[test]
    fn test_frame_rate_fallback_chain() {
        let raw = br#"{
            "streams": [{"codec_type": "video", "avg_frame_rate": "0/0",
                         "r_frame_rate": "0/0", "time_base": "1/24", "width": 2, "height": 2}]
        }"#;
        let info = parse_probe_output(raw, 25.0).unwrap();
        assert!((info.frame_rate - 24.0).abs() < 1e-9);
        assert_eq!(info.duration_secs, 0.0);

        let raw = br#"{"streams": [{"codec_type": "video", "width": 2, "height": 2}]}"#;
        let info = parse_probe_output(raw, 25.0).unwrap();
        assert_eq!(info.frame_rate, 25.0);
    }

    #[test]
    fn test_missing_video_stream() {
        let raw = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(parse_probe_output(raw, 25.0), Err(SamplerError::Probe(_))));
    }

    #[test]
    fn test_skips_cover_art_stream() {
        let raw = br#"{
            "streams": [
                {"index": 0, "codec_type": "video", "width": 600, "height": 600,
                 "disposition": {"default": 0, "attached_pic": 1}},
                {"index": 1, "codec_type": "audio"},
                {"index": 2, "codec_type": "video", "avg_frame_rate": "30/1",
                 "width": 1280, "height": 720, "disposition": {"default": 1, "attached_pic": 0}}
            ],
            "format": {"duration": "4.0"}
        }"#;

        let info = parse_probe_output(raw, 25.0).unwrap();
        assert_eq!(info.stream_index, 2);
        assert_eq!((info.width, info.height), (1280, 720));
    }

    #[test]
    fn test_rotated_stream_output_size() {
        let raw = br#"{
            "streams": [{"index": 0, "codec_type": "video", "avg_frame_rate": "30/1",
                         "width": 1920, "height": 1080,
                         "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}]
        }"#;
        let info = parse_probe_output(raw, 25.0).unwrap();
        assert_eq!(info.rotation, -90);
        assert_eq!(info.output_size(), (1080, 1920));

        let raw = br#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080,
                         "tags": {"rotate": "180"}}]
        }"#;
        let info = parse_probe_output(raw, 25.0).unwrap();
        assert_eq!(info.stream_index, 0);
        assert_eq!(info.output_size(), (1920, 1080));
    }

    #[test]
    fn test_garbage_output() {
        assert!(matches!(parse_probe_output(b"not json", 25.0), Err(SamplerError::Probe(_))));
    }
}
