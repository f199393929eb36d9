mod backend;
mod backends;

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::classifier::FeatureImage;
use crate::geometry::BoundingBox;

pub use backend::ImagePipeline;
pub use backends::{CpuPipeline, ScriptedPipeline};

/// Backend names accepted by [`select_pipeline`].
pub const PIPELINE_NAMES: [&str; 2] = ["cpu", "scripted"];

/// Build a pipeline by its configured name.
pub fn select_pipeline(name: &str) -> Result<Box<dyn ImagePipeline>> {
    match name.trim() {
        "cpu" => Ok(Box::new(CpuPipeline::new())),
        "scripted" => Ok(Box::new(ScriptedPipeline::new())),
        other => Err(anyhow!(
            "unknown pipeline backend '{}' (expected one of: {})",
            other,
            PIPELINE_NAMES.join(", ")
        )),
    }
}

/// Crop `region` (clipped to the image) and resize it with cubic
/// interpolation. `None` when nothing of the region lies inside `source`.
pub(crate) fn crop_resized(
    source: &GrayImage,
    region: &BoundingBox,
    width: u32,
    height: u32,
) -> Option<FeatureImage> {
    let left = region.left().clamp(0, source.width() as i32) as u32;
    let right = region.right().clamp(0, source.width() as i32) as u32;
    let top = region.top().clamp(0, source.height() as i32) as u32;
    let bottom = region.bottom().clamp(0, source.height() as i32) as u32;
    if right <= left || bottom <= top {
        return None;
    }
    let crop = imageops::crop_imm(source, left, top, right - left, bottom - top).to_image();
    let resized = if crop.dimensions() == (width, height) {
        crop
    } else {
        imageops::resize(&crop, width, height, FilterType::CatmullRom)
    };
    Some(FeatureImage::from_gray(resized))
}
