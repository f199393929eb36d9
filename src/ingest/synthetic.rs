//! Synthetic (`stub://`) frame source.
//!
//! Renders a deterministic scene: an empty room for a few frames, then a
//! tall bright figure walking across it, then the same figure lying flat on
//! the floor. Useful for exercising the whole pipeline without footage.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;
use crate::geometry::FrameBounds;

/// Frames rendered when no limit is configured.
pub const DEFAULT_SYNTHETIC_FRAMES: u64 = 48;

/// Frames of empty room used to seed background models.
const EMPTY_FRAMES: u64 = 3;

const FIGURE: Rgb<u8> = Rgb([235, 230, 220]);

pub struct SyntheticSource {
    uri: String,
    bounds: FrameBounds,
    total_frames: u64,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(uri: &str, bounds: FrameBounds, limit: Option<u64>) -> Self {
        Self {
            uri: uri.to_string(),
            bounds,
            total_frames: limit.unwrap_or(DEFAULT_SYNTHETIC_FRAMES),
            frame_count: 0,
            connected: false,
        }
    }

    /// Figure rectangle `(x, y, width, height)` for a frame, if visible.
    fn figure_at(&self, index: u64) -> Option<(u32, u32, u32, u32)> {
        if index < EMPTY_FRAMES {
            return None;
        }
        let FrameBounds { width, height } = self.bounds;
        // Small periodic change in size, like a real silhouette's jitter.
        let sway = (index % 3) as u32 * 2;
        let body_long = (height / 3).max(4) + sway;
        let body_short = (width / 12).max(2);
        let floor = height.saturating_sub(height / 10);
        let walking = (self.total_frames.saturating_sub(EMPTY_FRAMES) / 2).max(1);
        let step = index - EMPTY_FRAMES;

        if step < walking {
            let travel = width.saturating_sub(body_long + body_short) as u64;
            let x = (width / 10) as u64 + travel * step / walking / 2;
            Some((
                x as u32,
                floor.saturating_sub(body_long),
                body_short,
                body_long,
            ))
        } else {
            let x = (width / 2).saturating_sub(body_long / 2);
            Some((x, floor.saturating_sub(body_short), body_long, body_short))
        }
    }

    fn render(&self, index: u64) -> RgbImage {
        let FrameBounds { width, height } = self.bounds;
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            let shade = 30 + ((x / 16 + y / 16) % 2) as u8 * 6;
            Rgb([shade, shade, shade + 4])
        });
        if let Some((x0, y0, w, h)) = self.figure_at(index) {
            for y in y0..(y0 + h).min(height) {
                for x in x0..(x0 + w).min(width) {
                    image.put_pixel(x, y, FIGURE);
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {} ({} frames)", self.uri, self.total_frames);
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("SyntheticSource: next_frame called before connect"));
        }
        if self.frame_count >= self.total_frames {
            return Ok(None);
        }
        let frame = Frame::new(self.frame_count, self.render(self.frame_count));
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            uri: self.uri.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_starts_empty_then_stands_then_lies() {
        let source = SyntheticSource::new("stub://", FrameBounds::default(), Some(40));
        assert!(source.figure_at(0).is_none());

        let (_, _, w, h) = source.figure_at(EMPTY_FRAMES).unwrap();
        assert!(h > w, "walking figure should be tall");

        let (x, y, w, h) = source.figure_at(39).unwrap();
        assert!(w > h, "fallen figure should be wide");
        assert!(x + w <= 640 && y + h <= 480);
    }

    #[test]
    fn renders_at_configured_bounds() {
        let mut source = SyntheticSource::new("stub://", FrameBounds::new(80, 60), None);
        source.connect().unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (80, 60));
        let mut count = 1;
        while source.next_frame().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, DEFAULT_SYNTHETIC_FRAMES);
    }
}
