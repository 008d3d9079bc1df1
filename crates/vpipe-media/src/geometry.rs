//! Crop window and output size calculations.

use vpipe_models::encoding::{FALLBACK_HEIGHT, FALLBACK_WIDTH};
use vpipe_models::CropRect;

/// Frame dimensions of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size assumed when probing fails.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_WIDTH, FALLBACK_HEIGHT)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Compute the largest window of the target aspect ratio that fits the frame.
///
/// The window spans the full height when the source is wider than the target
/// and the full width otherwise. Offsets bias the window inside the leftover
/// slack: `0` keeps it centred, `100` pushes it by a full slack width. The
/// result is clamped so the window never leaves the frame.
pub fn resolve_crop(
    target_width: u32,
    target_height: u32,
    frame: FrameSize,
    x_offset_percent: f64,
    y_offset_percent: f64,
) -> CropRect {
    if frame.is_empty() || target_width == 0 || target_height == 0 {
        return CropRect {
            crop_width: frame.width,
            crop_height: frame.height,
            crop_x: 0,
            crop_y: 0,
        };
    }

    let (in_w, in_h) = (frame.width as u64, frame.height as u64);
    let (tw, th) = (target_width as u64, target_height as u64);

    // Compare aspect ratios with integer cross-multiplication.
    let (crop_w, crop_h, raw_x, raw_y) = if in_w * th > in_h * tw {
        let crop_h = frame.height;
        let crop_w = (((in_h * tw) as f64 / th as f64).round() as u32).clamp(1, frame.width);
        let slack = (frame.width - crop_w) as f64;
        (
            crop_w,
            crop_h,
            slack / 2.0 + x_offset_percent / 100.0 * slack,
            0.0,
        )
    } else {
        let crop_w = frame.width;
        let crop_h = (((in_w * th) as f64 / tw as f64).round() as u32).clamp(1, frame.height);
        let slack = (frame.height - crop_h) as f64;
        (
            crop_w,
            crop_h,
            0.0,
            slack / 2.0 + y_offset_percent / 100.0 * slack,
        )
    };

    CropRect {
        crop_width: crop_w,
        crop_height: crop_h,
        crop_x: clamp_offset(raw_x, frame.width - crop_w),
        crop_y: clamp_offset(raw_y, frame.height - crop_h),
    }
}

fn clamp_offset(value: f64, max: u32) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    (value.round().max(0.0) as u32).min(max)
}

/// Scale `width`×`height` down to fit inside `max_width`×`max_height`,
/// preserving the aspect ratio. Sizes that already fit are kept.
/// Both results are even and at least 2.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (even(max_width), even(max_height));
    }

    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);

    (
        even((width as f64 * scale).round() as u32),
        even((height as f64 * scale).round() as u32),
    )
}

/// Round down to an even number, minimum 2. Chroma-subsampled encoders reject odd sizes.
pub fn even(value: u32) -> u32 {
    (value & !1).max(2)
}
