//! FFmpeg filter expressions for pipeline steps.

use vpipe_models::{CropRect, FrameRect};

/// Crop to `rect`, then scale to the output size with square pixels.
pub fn crop_and_scale(rect: &CropRect, out_width: u32, out_height: u32) -> String {
    format!(
        "{},scale={}:{},setsar=1",
        rect.to_filter(),
        out_width,
        out_height
    )
}

/// Largest box blur radius that is valid for a region on a 4:2:0 frame.
///
/// Chroma planes are half size and FFmpeg rejects radii above half a plane dimension.
pub fn blur_radius(region: &FrameRect, max_radius: u32) -> u32 {
    (region.width.min(region.height) / 4).min(max_radius)
}

/// Filter graph that blurs each region in place.
///
/// Returns the graph and the label of its final video output, or `None`
/// when no region is large enough to blur.
pub fn region_blur_graph(regions: &[FrameRect], max_radius: u32) -> Option<(String, String)> {
    let blurrable: Vec<(&FrameRect, u32)> = regions
        .iter()
        .map(|r| (r, blur_radius(r, max_radius)))
        .filter(|(_, radius)| *radius > 0)
        .collect();

    if blurrable.is_empty() {
        return None;
    }

    let n = blurrable.len();
    let mut chains = Vec::with_capacity(2 * n + 1);

    let split_outputs: String = std::iter::once("[base]".to_string())
        .chain((0..n).map(|i| format!("[r{}]", i)))
        .collect();
    chains.push(format!("[0:v]split={}{}", n + 1, split_outputs));

    for (i, (region, radius)) in blurrable.iter().enumerate() {
        chains.push(format!(
            "[r{i}]crop={}:{}:{}:{},boxblur={radius}:1[b{i}]",
            region.width, region.height, region.x, region.y
        ));
    }

    let mut current = "base".to_string();
    for (i, (region, _)) in blurrable.iter().enumerate() {
        let next = format!("v{}", i);
        chains.push(format!(
            "[{}][b{}]overlay={}:{}[{}]",
            current, i, region.x, region.y, next
        ));
        current = next;
    }

    Some((chains.join(";"), current))
}
