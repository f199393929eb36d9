use anyhow::Result;
use image::GrayImage;

use crate::classifier::FeatureImage;
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Image-processing operations the decision engine consumes.
///
/// Implementations own whatever state they need across frames (for example a
/// background model); the session passes the same pipeline value to every
/// frame. Any error is treated as a collaborator failure and aborts the
/// session.
pub trait ImagePipeline {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Background-subtracted mask of the frame (255 = foreground).
    fn segment_foreground(&mut self, frame: &Frame) -> Result<GrayImage>;

    /// Morphological closing with a square-ish kernel of `kernel_size` pixels.
    fn close(&self, mask: &GrayImage, kernel_size: u32) -> Result<GrayImage>;

    /// Bounding box of the dominant moving region, if any.
    fn detect_bounding_rect(&self, mask: &GrayImage) -> Result<Option<BoundingBox>>;

    /// Edge map of the frame (255 = edge).
    fn detect_edges(&self, frame: &Frame) -> Result<GrayImage>;

    /// Crop `region` out of `source` and resize it to `width` × `height`.
    /// Returns `None` when the region does not overlap the image.
    fn crop_and_resize(
        &self,
        source: &GrayImage,
        region: &BoundingBox,
        width: u32,
        height: u32,
    ) -> Result<Option<FeatureImage>>;
}

impl<P: ImagePipeline + ?Sized> ImagePipeline for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn segment_foreground(&mut self, frame: &Frame) -> Result<GrayImage> {
        (**self).segment_foreground(frame)
    }

    fn close(&self, mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
        (**self).close(mask, kernel_size)
    }

    fn detect_bounding_rect(&self, mask: &GrayImage) -> Result<Option<BoundingBox>> {
        (**self).detect_bounding_rect(mask)
    }

    fn detect_edges(&self, frame: &Frame) -> Result<GrayImage> {
        (**self).detect_edges(frame)
    }

    fn crop_and_resize(
        &self,
        source: &GrayImage,
        region: &BoundingBox,
        width: u32,
        height: u32,
    ) -> Result<Option<FeatureImage>> {
        (**self).crop_and_resize(source, region, width, height)
    }
}
