//! Sampled frame type

use image::{imageops, RgbImage};

/// One decoded frame selected by the sampling plan.
///
/// Consumed once by the per-frame analyzer and then dropped; nothing in the
/// pipeline keeps frames around.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Frame number in the native stream
    pub frame_number: u64,
    /// Presentation time in seconds, derived from the sampling rate
    pub timestamp_secs: f64,
    /// Position of this frame among the emitted samples (0-based)
    pub sample_index: u64,
    /// RGB pixel data
    pub image: RgbImage,
}

impl FrameSample {
    pub fn new(frame_number: u64, timestamp_secs: f64, sample_index: u64, image: RgbImage) -> Self {
        Self {
            frame_number,
            timestamp_secs,
            sample_index,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Crop a region of the frame, clamped to the image bounds.
    ///
    /// Returns `None` when the clamped region is empty.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<RgbImage> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let w = w.min(self.width() - x);
        let h = h.min(self.height() - y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(imageops::crop_imm(&self.image, x, y, w, h).to_image())
    }
}
