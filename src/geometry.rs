//! Bounding-box geometry.
//!
//! Boxes use integer pixel coordinates in frame space. `left`/`top` are the
//! inclusive top-left corner, `right`/`bottom` the exclusive bottom-right
//! corner, so `width = right - left` and `height = bottom - top`.

use serde::{Deserialize, Serialize};

/// Default capture width in pixels.
pub const SCREEN_WIDTH: u32 = 640;

/// Default capture height in pixels.
pub const SCREEN_HEIGHT: u32 = 480;

/// Extra width granted before a box counts as "wide" for the overlay hint.
const ASPECT_BUFFER_PX: i32 = 40;

/// Frame dimensions used for clamping and for the full-frame area sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBounds {
    pub width: u32,
    pub height: u32,
}

impl FrameBounds {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Area of the whole frame.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl Default for FrameBounds {
    fn default() -> Self {
        Self::new(SCREEN_WIDTH, SCREEN_HEIGHT)
    }
}

/// Crude posture hint derived from the box shape. Not authoritative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectHint {
    /// Wide or flat box (`width + 40 > height`), drawn red.
    Wide,
    /// Tall box, drawn green.
    Tall,
}

/// Axis-aligned rectangle with cached width and height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
    width: i32,
    height: i32,
}

impl BoundingBox {
    /// Build a box from its four edges. Swapped edges are reordered so the
    /// box never has a negative extent.
    pub fn new(left: i32, right: i32, top: i32, bottom: i32) -> Self {
        let (left, right) = if left <= right {
            (left, right)
        } else {
            (right, left)
        };
        let (top, bottom) = if top <= bottom {
            (top, bottom)
        } else {
            (bottom, top)
        };
        Self {
            left,
            right,
            top,
            bottom,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Build a box from a top-left corner and a size, the shape most
    /// contour/bounding-rect routines report.
    pub fn from_rect(x: i32, y: i32, width: u32, height: u32) -> Self {
        let extend = |origin: i32, length: u32| {
            origin.saturating_add(i32::try_from(length).unwrap_or(i32::MAX))
        };
        Self::new(x, extend(x, width), y, extend(y, height))
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Integer midpoint of each axis.
    pub fn center(&self) -> (i32, i32) {
        (
            self.left + (self.right - self.left) / 2,
            self.top + (self.bottom - self.top) / 2,
        )
    }

    pub fn aspect_hint(&self) -> AspectHint {
        if self.width + ASPECT_BUFFER_PX > self.height {
            AspectHint::Wide
        } else {
            AspectHint::Tall
        }
    }

    /// Reshape the box to `new_width` × `new_height` keeping its center.
    ///
    /// Every coordinate is clamped into `[0, bounds.width] × [0, bounds.height]`
    /// toward the nearest frame edge; the cached extent is recomputed from the
    /// clamped corners.
    pub fn resize_around_center(&mut self, new_width: u32, new_height: u32, bounds: FrameBounds) {
        let (cx, cy) = self.center();
        let (cx, cy) = (i64::from(cx), i64::from(cy));
        let (w, h) = (i64::from(new_width), i64::from(new_height));
        let max_x = i64::from(bounds.width);
        let max_y = i64::from(bounds.height);

        let left = cx - w / 2;
        let top = cy - h / 2;

        self.left = left.clamp(0, max_x) as i32;
        self.right = (left + w).clamp(0, max_x) as i32;
        self.top = top.clamp(0, max_y) as i32;
        self.bottom = (top + h).clamp(0, max_y) as i32;
        self.width = self.right - self.left;
        self.height = self.bottom - self.top;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_rect_saturates() {
        let b = BoundingBox::from_rect(10, -5, u32::MAX, 20);
        assert_eq!(b.right(), i32::MAX);
        assert_eq!(b.bottom(), 15);
    }

    #[test]
    fn derived_values_follow_corners() {
        let b = BoundingBox::new(10, 60, 20, 120);
        assert_eq!(b.width(), 50);
        assert_eq!(b.height(), 100);
        assert_eq!(b.area(), 5000);
        assert_eq!(b.center(), (35, 70));
    }

    #[test]
    fn swapped_edges_are_reordered() {
        let b = BoundingBox::new(60, 10, 120, 20);
        assert_eq!((b.left(), b.right(), b.top(), b.bottom()), (10, 60, 20, 120));
    }

    #[test]
    fn from_rect_matches_corner_form() {
        assert_eq!(
            BoundingBox::from_rect(5, 7, 30, 40),
            BoundingBox::new(5, 35, 7, 47)
        );
    }

    #[test]
    fn resize_keeps_center_inside_frame() {
        let bounds = FrameBounds::default();
        let mut b = BoundingBox::new(300, 340, 200, 260);
        let before = b.center();
        b.resize_around_center(100, 100, bounds);
        assert_eq!(b.width(), 100);
        assert_eq!(b.height(), 100);
        assert_eq!(b.center(), before);
    }

    #[test]
    fn resize_clamps_to_nearest_edge() {
        let bounds = FrameBounds::default();

        let mut near_origin = BoundingBox::new(0, 20, 0, 20);
        near_origin.resize_around_center(200, 200, bounds);
        assert_eq!(near_origin.left(), 0);
        assert_eq!(near_origin.top(), 0);
        assert_eq!(near_origin.right(), 110);
        assert_eq!(near_origin.bottom(), 110);

        let mut near_far_corner = BoundingBox::new(620, 640, 460, 480);
        near_far_corner.resize_around_center(200, 200, bounds);
        assert_eq!(near_far_corner.right(), SCREEN_WIDTH as i32);
        assert_eq!(near_far_corner.bottom(), SCREEN_HEIGHT as i32);
        assert_eq!(near_far_corner.left(), 530);
        assert_eq!(near_far_corner.top(), 370);
        assert_eq!(near_far_corner.width(), 110);
    }

    #[test]
    fn repeated_resizes_stay_in_bounds_and_near_center() {
        let bounds = FrameBounds::default();
        let sizes = [(10, 10), (700, 20), (33, 517), (1, 1), (640, 480), (99, 101)];
        let mut b = BoundingBox::new(250, 350, 150, 290);
        for (w, h) in sizes {
            let before = b.center();
            b.resize_around_center(w, h, bounds);
            assert!(b.left() >= 0 && b.right() <= bounds.width as i32);
            assert!(b.top() >= 0 && b.bottom() <= bounds.height as i32);
            assert!(b.left() <= b.right() && b.top() <= b.bottom());
            assert_eq!(b.width() as i32, b.right() - b.left());
            assert_eq!(b.height() as i32, b.bottom() - b.top());
            // Clamping moves the center; an unclamped resize must not.
            if b.width() == w && b.height() == h {
                let (cx, cy) = b.center();
                assert!((cx - before.0).abs() <= 1, "x drift {} vs {}", cx, before.0);
                assert!((cy - before.1).abs() <= 1, "y drift {} vs {}", cy, before.1);
            }
        }
    }

    #[test]
    fn aspect_hint_uses_buffer() {
        assert_eq!(BoundingBox::new(0, 100, 0, 120).aspect_hint(), AspectHint::Wide);
        assert_eq!(BoundingBox::new(0, 60, 0, 140).aspect_hint(), AspectHint::Tall);
    }
}
