use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A rectangle in source pixel space as drawn by the client.
///
/// Values may be fractional and may extend past the frame; use
/// [`PixelRect::clamp_to_frame`] before handing them to FFmpeg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PixelRect {
    /// X coordinate of the top-left corner
    pub x: f64,
    /// Y coordinate of the top-left corner
    pub y: f64,
    /// Width in pixels
    pub width: f64,
    /// Height in pixels
    pub height: f64,
}

impl PixelRect {
    /// Create a new pixel rectangle.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Check that the rectangle has a finite position and a positive area.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Round to whole pixels and intersect with a `frame_width`×`frame_height` frame.
    ///
    /// Returns `None` when nothing of the rectangle is left inside the frame.
    pub fn clamp_to_frame(&self, frame_width: u32, frame_height: u32) -> Option<FrameRect> {
        if !self.is_valid() || frame_width == 0 || frame_height == 0 {
            return None;
        }

        let fw = frame_width as f64;
        let fh = frame_height as f64;

        let left = self.x.round().clamp(0.0, fw);
        let top = self.y.round().clamp(0.0, fh);
        let right = (self.x + self.width).round().clamp(0.0, fw);
        let bottom = (self.y + self.height).round().clamp(0.0, fh);

        if right - left < 1.0 || bottom - top < 1.0 {
            return None;
        }

        Some(FrameRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// An integer rectangle guaranteed to lie inside a known frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop window computed for an aspect-ratio crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub crop_width: u32,
    pub crop_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
}

impl CropRect {
    /// FFmpeg `crop` filter expression for this window.
    pub fn to_filter(&self) -> String {
        format!(
            "crop={}:{}:{}:{}",
            self.crop_width, self.crop_height, self.crop_x, self.crop_y
        )
    }
}

/// Affine map from source pixel coordinates into the frame of a later
/// artifact, built by following each crop and rescale applied so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMapping {
    scale_x: f64,
    scale_y: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Default for FrameMapping {
    fn default() -> Self {
        Self::identity()
    }
}

impl FrameMapping {
    pub fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Follow a crop to `window` that was scaled to `out_width`×`out_height`.
    pub fn then_crop(self, window: &CropRect, out_width: u32, out_height: u32) -> Self {
        if window.crop_width == 0 || window.crop_height == 0 {
            return self;
        }
        let kx = out_width as f64 / window.crop_width as f64;
        let ky = out_height as f64 / window.crop_height as f64;
        Self {
            scale_x: self.scale_x * kx,
            scale_y: self.scale_y * ky,
            offset_x: (self.offset_x - window.crop_x as f64) * kx,
            offset_y: (self.offset_y - window.crop_y as f64) * ky,
        }
    }

    pub fn map_rect(&self, rect: &PixelRect) -> PixelRect {
        PixelRect::new(
            rect.x * self.scale_x + self.offset_x,
            rect.y * self.scale_y + self.offset_y,
            rect.width * self.scale_x,
            rect.height * self.scale_y,
        )
    }
}
