use std::collections::VecDeque;

use anyhow::Result;
use image::{GrayImage, Luma};

use crate::classifier::FeatureImage;
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::vision::backend::ImagePipeline;
use crate::vision::crop_resized;

/// Deterministic pipeline that replays a programmed sequence of detections.
///
/// Each call to `segment_foreground` consumes one step. The mask is the
/// step's box filled with 255, detection reports the box unchanged, closing
/// is the identity and the edge map is the frame's luma. Once the script is
/// exhausted every frame reports no movement.
#[derive(Clone, Debug, Default)]
pub struct ScriptedPipeline {
    script: VecDeque<Option<BoundingBox>>,
    current: Option<BoundingBox>,
    consumed: usize,
}

impl ScriptedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections<I>(detections: I) -> Self
    where
        I: IntoIterator<Item = Option<BoundingBox>>,
    {
        Self {
            script: detections.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push_detection(&mut self, detection: Option<BoundingBox>) {
        self.script.push_back(detection);
    }

    /// Steps replayed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl ImagePipeline for ScriptedPipeline {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn segment_foreground(&mut self, frame: &Frame) -> Result<GrayImage> {
        self.current = self.script.pop_front().flatten();
        self.consumed += 1;

        let mut mask = GrayImage::new(frame.width(), frame.height());
        if let Some(rect) = self.current {
            let x0 = rect.left().clamp(0, frame.width() as i32) as u32;
            let x1 = rect.right().clamp(0, frame.width() as i32) as u32;
            let y0 = rect.top().clamp(0, frame.height() as i32) as u32;
            let y1 = rect.bottom().clamp(0, frame.height() as i32) as u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    mask.put_pixel(x, y, Luma([u8::MAX]));
                }
            }
        }
        Ok(mask)
    }

    fn close(&self, mask: &GrayImage, _kernel_size: u32) -> Result<GrayImage> {
        Ok(mask.clone())
    }

    fn detect_bounding_rect(&self, _mask: &GrayImage) -> Result<Option<BoundingBox>> {
        Ok(self.current)
    }

    fn detect_edges(&self, frame: &Frame) -> Result<GrayImage> {
        Ok(frame.to_gray())
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
