use std::io::Cursor;

use image::{DynamicImage, codecs::jpeg::JpegEncoder, imageops::FilterType};

use crate::{error::CaptureError, types::SamplingPlan};

pub const MAX_WIDTH: u32 = 1280;
pub const MAX_HEIGHT: u32 = 720;
pub const JPEG_QUALITY: u8 = 85;

/// Lazy, finite sequence of capture timestamps: `0, interval, 2*interval, ...`
/// while below the duration and under the frame cap.
#[derive(Debug, Clone)]
pub struct SamplingSchedule {
    duration: f64,
    interval: f64,
    max_frames: usize,
    next_index: usize,
}

impl SamplingSchedule {
    pub fn new(duration: f64, plan: &SamplingPlan) -> Self {
        Self {
            duration,
            interval: f64::from(plan.interval_seconds()),
            max_frames: plan.max_frames(),
            next_index: 0,
        }
    }

    /// Number of timestamps left in the schedule.
    pub fn remaining(&self) -> usize {
        self.clone().count()
    }
}

impl Iterator for SamplingSchedule {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next_index >= self.max_frames {
            return None;
        }
        // Multiply instead of accumulating so late timestamps do not drift.
        let timestamp = self.next_index as f64 * self.interval;
        if timestamp >= self.duration {
            return None;
        }
        self.next_index += 1;
        Some(timestamp)
    }
}

/// Output size for a `width`x`height` picture so it fits in 1280x720 with the
/// aspect ratio kept. Pictures already inside the box are left alone.
pub fn fit_within(width: u32, height: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= MAX_WIDTH && height <= MAX_HEIGHT) {
        return (width, height);
    }

    let aspect = f64::from(width) / f64::from(height);
    let box_aspect = f64::from(MAX_WIDTH) / f64::from(MAX_HEIGHT);
    if aspect > box_aspect {
        let h = (f64::from(MAX_WIDTH) / aspect).round() as u32;
        (MAX_WIDTH, h.max(1))
    } else {
        let w = (f64::from(MAX_HEIGHT) * aspect).round() as u32;
        (w.max(1), MAX_HEIGHT)
    }
}

/// Scales `image` to `target` if needed and encodes it as JPEG.
pub fn encode_jpeg(image: &DynamicImage, target: (u32, u32)) -> Result<Vec<u8>, CaptureError> {
    let (width, height) = target;
    let rgb = if (image.width(), image.height()) == target {
        image.to_rgb8()
    } else {
        image
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8()
    };

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(buffer.into_inner())
}
