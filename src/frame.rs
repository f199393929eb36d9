//! Frames and per-frame derived state.
//!
//! - `Frame`: one decoded video frame with its position in the stream.
//! - `FrameState`: what the decision engine derives from one frame: the
//!   foreground mask, the detected box, the movement flag and the closing
//!   kernel size for silhouette extraction.
//!
//! Pixel work is delegated to the [`ImagePipeline`] passed in by the caller;
//! this module only decides which operations to request and with which
//! parameters.

use anyhow::Result;
use image::{GrayImage, RgbImage};

use crate::classifier::{FeatureImage, FEATURE_HEIGHT, FEATURE_WIDTH};
use crate::geometry::{BoundingBox, FrameBounds};
use crate::vision::ImagePipeline;

/// Kernel size used to merge fragments before locating the moving region.
pub const DETECTION_KERNEL_SIZE: u32 = 30;

/// Crops are only taken from boxes strictly larger than this many pixels.
pub const CROP_MIN_AREA: u64 = 1000;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded RGB frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Zero-based position in the source.
    pub index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn bounds(&self) -> FrameBounds {
        FrameBounds::new(self.width(), self.height())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Luma conversion of the frame.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

// ----------------------------------------------------------------------------
// Kernel sizing
// ----------------------------------------------------------------------------

/// Closing kernel size for a subject `width` pixels wide.
///
/// Wider (closer) subjects get larger kernels to merge limb fragments;
/// narrower ones get smaller kernels so the silhouette is not erased. Widths
/// under 20 map back up to 10.
pub fn dynamic_kernel_size(width: u32) -> u32 {
    match width {
        250.. => 30,
        120..=249 => 25,
        100..=119 => 20,
        60..=99 => 15,
        40..=59 => 10,
        20..=39 => 5,
        _ => 10,
    }
}

// ----------------------------------------------------------------------------
// FrameState
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct FrameState {
    foreground: GrayImage,
    bounding_box: Option<BoundingBox>,
    kernel_size: u32,
}

impl FrameState {
    /// Segment the frame and locate the moving region.
    pub fn build(frame: &Frame, pipeline: &mut dyn ImagePipeline) -> Result<Self> {
        let foreground = pipeline.segment_foreground(frame)?;
        let detection_mask = pipeline.close(&foreground, DETECTION_KERNEL_SIZE)?;
        let bounding_box = pipeline.detect_bounding_rect(&detection_mask)?;
        Ok(Self::from_parts(foreground, bounding_box))
    }

    /// Assemble state from an already-segmented mask and detection.
    pub fn from_parts(foreground: GrayImage, bounding_box: Option<BoundingBox>) -> Self {
        let kernel_size = bounding_box
            .map(|b| dynamic_kernel_size(b.width()))
            .unwrap_or(DETECTION_KERNEL_SIZE);
        Self {
            foreground,
            bounding_box,
            kernel_size,
        }
    }

    pub fn movement_detected(&self) -> bool {
        self.bounding_box.is_some()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box
    }

    /// Replace the tracked box, e.g. after occlusion correction. The kernel
    /// size stays tied to the originally detected width.
    pub fn set_bounding_box(&mut self, bounding_box: BoundingBox) {
        self.bounding_box = Some(bounding_box);
    }

    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    pub fn foreground(&self) -> &GrayImage {
        &self.foreground
    }

    fn crop_region(&self) -> Option<BoundingBox> {
        self.bounding_box.filter(|b| b.area() > CROP_MIN_AREA)
    }

    /// Closed silhouette crop of the tracked box, resized to the feature shape.
    pub fn extract_foreground(&self, pipeline: &dyn ImagePipeline) -> Result<Option<FeatureImage>> {
        let Some(region) = self.crop_region() else {
            return Ok(None);
        };
        let closed = pipeline.close(&self.foreground, self.kernel_size)?;
        pipeline.crop_and_resize(&closed, &region, FEATURE_WIDTH, FEATURE_HEIGHT)
    }

    /// Edge crop of the tracked box, limited to foreground pixels.
    pub fn extract_edges(
        &self,
        frame: &Frame,
        pipeline: &dyn ImagePipeline,
    ) -> Result<Option<FeatureImage>> {
        let Some(region) = self.crop_region() else {
            return Ok(None);
        };
        let edges = pipeline.detect_edges(frame)?;
        let masked = mask_with(&edges, &self.foreground);
        pipeline.crop_and_resize(&masked, &region, FEATURE_WIDTH, FEATURE_HEIGHT)
    }
}

/// Keep `image` pixels where `mask` is fully set. Mismatched sizes keep only
/// the overlapping area.
fn mask_with(image: &GrayImage, mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let keep = x < mask.width() && y < mask.height() && mask.get_pixel(x, y).0[0] == u8::MAX;
        if keep {
            *image.get_pixel(x, y)
        } else {
            image::Luma([0])
        }
    })
}
