use anyhow::{bail, Result};
use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::classifier::FeatureImage;
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::vision::backend::ImagePipeline;
use crate::vision::crop_resized;

/// Weight of the newest frame in the background average.
pub const LEARNING_RATE: f32 = 0.02;

/// Absolute luma difference above which a pixel counts as foreground.
pub const FOREGROUND_DELTA: f32 = 25.0;

/// Binarisation level applied before region labelling.
pub const DETECTION_THRESHOLD: u8 = 91;

/// Canny hysteresis thresholds.
pub const CANNY_LOW: f32 = 60.0;
pub const CANNY_HIGH: f32 = 120.0;

const BLUR_SIGMA: f32 = 1.0;

/// Running-average background model over blurred luma.
struct Background {
    width: u32,
    height: u32,
    mean: Vec<f32>,
}

/// Pure-Rust pipeline: running-average background subtraction, square
/// closing, largest connected component, Canny edges.
#[derive(Default)]
pub struct CpuPipeline {
    background: Option<Background>,
}

impl CpuPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the background model; the next frame re-seeds it.
    pub fn reset(&mut self) {
        self.background = None;
    }

    fn smoothed(frame: &Frame) -> GrayImage {
        gaussian_blur_f32(&frame.to_gray(), BLUR_SIGMA)
    }
}

impl ImagePipeline for CpuPipeline {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn segment_foreground(&mut self, frame: &Frame) -> Result<GrayImage> {
        let gray = Self::smoothed(frame);
        let (width, height) = gray.dimensions();

        let seeded = matches!(
            &self.background,
            Some(bg) if bg.width == width && bg.height == height
        );
        if !seeded {
            if self.background.is_some() {
                log::debug!("frame size changed to {}x{}, re-seeding background", width, height);
            }
            self.background = Some(Background {
                width,
                height,
                mean: gray.as_raw().iter().map(|p| f32::from(*p)).collect(),
            });
            return Ok(GrayImage::new(width, height));
        }
        let Some(background) = self.background.as_mut() else {
            return Ok(GrayImage::new(width, height));
        };

        let mut mask = GrayImage::new(width, height);
        for ((mean, pixel), out) in background
            .mean
            .iter_mut()
            .zip(gray.as_raw())
            .zip(mask.iter_mut())
        {
            let value = f32::from(*pixel);
            if (value - *mean).abs() > FOREGROUND_DELTA {
                *out = u8::MAX;
            }
            *mean += LEARNING_RATE * (value - *mean);
        }
        Ok(mask)
    }

    fn close(&self, mask: &GrayImage, kernel_size: u32) -> Result<GrayImage> {
        if kernel_size == 0 {
            bail!("closing kernel size must be positive");
        }
        let radius = u8::try_from(kernel_size / 2).unwrap_or(u8::MAX);
        Ok(morphology::close(mask, Norm::LInf, radius))
    }

    fn detect_bounding_rect(&self, mask: &GrayImage) -> Result<Option<BoundingBox>> {
        let binary = threshold(mask, DETECTION_THRESHOLD, ThresholdType::Binary);
        let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

        // label -> (pixel count, min x, min y, max x, max y)
        let mut regions: Vec<(u64, u32, u32, u32, u32)> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0] as usize;
            if label == 0 {
                continue;
            }
            if regions.len() < label {
                regions.resize(label, (0, u32::MAX, u32::MAX, 0, 0));
            }
            let region = &mut regions[label - 1];
            region.0 += 1;
            region.1 = region.1.min(x);
            region.2 = region.2.min(y);
            region.3 = region.3.max(x);
            region.4 = region.4.max(y);
        }

        let largest = regions
            .into_iter()
            .filter(|region| region.0 > 0)
            .max_by_key(|region| region.0);
        Ok(largest.map(|(_, min_x, min_y, max_x, max_y)| {
            BoundingBox::from_rect(
                min_x as i32,
                min_y as i32,
                max_x - min_x + 1,
                max_y - min_y + 1,
            )
        }))
    }

    fn detect_edges(&self, frame: &Frame) -> Result<GrayImage> {
        Ok(canny(&Self::smoothed(frame), CANNY_LOW, CANNY_HIGH))
    }

    fn crop_and_resize(
        &self,
        source: &GrayImage,
        region: &BoundingBox,
        width: u32,
        height: u32,
    ) -> Result<Option<FeatureImage>> {
        Ok(crop_resized(source, region, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with_square(index: u64, x0: u32, y0: u32, size: u32) -> Frame {
        let mut image = RgbImage::new(64, 64);
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        Frame::new(index, image)
    }

    #[test]
    fn first_frame_seeds_background() {
        let mut pipeline = CpuPipeline::new();
        let mask = pipeline
            .segment_foreground(&frame_with_square(0, 10, 10, 20))
            .unwrap();
        assert!(mask.iter().all(|p| *p == 0));
    }

    #[test]
    fn new_object_becomes_foreground() {
        let mut pipeline = CpuPipeline::new();
        pipeline
            .segment_foreground(&Frame::new(0, RgbImage::new(64, 64)))
            .unwrap();
        let mask = pipeline
            .segment_foreground(&frame_with_square(1, 20, 20, 16))
            .unwrap();
        assert_eq!(mask.get_pixel(28, 28).0[0], 255);
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);

        let rect = pipeline.detect_bounding_rect(&mask).unwrap().unwrap();
        let (cx, cy) = rect.center();
        assert!((26..=30).contains(&cx) && (26..=30).contains(&cy));
    }

    #[test]
    fn largest_region_wins() {
        let pipeline = CpuPipeline::new();
        let mut mask = GrayImage::new(100, 100);
        for y in 20..60 {
            for x in 10..30 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 80..85 {
            for x in 80..85 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let rect = pipeline.detect_bounding_rect(&mask).unwrap().unwrap();
        assert_eq!(rect, BoundingBox::from_rect(10, 20, 20, 40));
    }

    #[test]
    fn faint_mask_has_no_region() {
        let pipeline = CpuPipeline::new();
        let mask = GrayImage::from_pixel(30, 30, Luma([80]));
        assert!(pipeline.detect_bounding_rect(&mask).unwrap().is_none());
    }

    #[test]
    fn closing_bridges_small_gaps() {
        let pipeline = CpuPipeline::new();
        let mut mask = GrayImage::new(40, 10);
        for x in (5..35).filter(|x| *x != 20) {
            for y in 3..7 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let closed = pipeline.close(&mask, 5).unwrap();
        assert_eq!(closed.get_pixel(20, 5).0[0], 255);
        assert!(pipeline.close(&mask, 0).is_err());
    }

    #[test]
    fn edges_follow_the_square_outline() {
        let pipeline = CpuPipeline::new();
        let edges = pipeline.detect_edges(&frame_with_square(0, 16, 16, 32)).unwrap();
        assert!(edges.iter().any(|p| *p == 255));
        assert_eq!(edges.get_pixel(32, 32).0[0], 0);
        assert_eq!(edges.get_pixel(2, 2).0[0], 0);
    }
}
