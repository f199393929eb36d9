//! Frame overlays: the tracked box drawn on a copy of the frame.
//!
//! Wide boxes (`width + 40 > height`) are drawn red, tall ones green. Boxes
//! are only drawn for classified frames whose box exceeds
//! [`OVERLAY_MIN_AREA`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::frame::Frame;
use crate::geometry::AspectHint;
use crate::session::FrameOutcome;

/// Boxes at or below this area are not drawn.
pub const OVERLAY_MIN_AREA: u64 = 500;

pub const WIDE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const TALL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Stroke width in pixels.
const STROKE: i32 = 2;

pub fn color_for(hint: AspectHint) -> Rgb<u8> {
    match hint {
        AspectHint::Wide => WIDE_COLOR,
        AspectHint::Tall => TALL_COLOR,
    }
}

/// Copy of the frame with the outcome's box drawn on it, if any.
pub fn render(frame: &Frame, outcome: &FrameOutcome) -> RgbImage {
    let mut canvas = frame.image().clone();
    let (Some(hint), Some(bounding_box)) = (outcome.overlay, outcome.bounding_box) else {
        return canvas;
    };
    let color = color_for(hint);
    for inset in 0..STROKE {
        let width = bounding_box.width() as i32 - 2 * inset;
        let height = bounding_box.height() as i32 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(bounding_box.left() + inset, bounding_box.top() + inset)
            .of_size(width as u32, height as u32);
        draw_hollow_rect_mut(&mut canvas, rect, color);
    }
    canvas
}

/// Render and save the overlay as `frame_{index}.png` under `dir`.
pub fn write(dir: &Path, frame: &Frame, outcome: &FrameOutcome) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create overlay directory {}", dir.display()))?;
    let path = dir.join(format!("frame_{:06}.png", frame.index));
    render(frame, outcome)
        .save(&path)
        .with_context(|| format!("failed to write overlay {}", path.display()))?;
    Ok(path)
}
