//! Sliding windows of recent geometry and classifications.
//!
//! `FrameHistory` keeps two independent FIFO windows for one session:
//! recent bounding boxes (for occlusion compensation) and recent
//! classification pairs (for diagnostics). Both are bounded; a full window
//! must have its oldest entry evicted before another is admitted.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::VecDeque;

use crate::geometry::{BoundingBox, FrameBounds};
use crate::PoseLabel;

/// Default capacity of each window.
pub const DEFAULT_WINDOW: usize = 10;

/// Labels produced for one frame, one per characteristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClassificationPair {
    pub edge: PoseLabel,
    pub foreground: PoseLabel,
}

impl ClassificationPair {
    pub fn new(edge: PoseLabel, foreground: PoseLabel) -> Self {
        Self { edge, foreground }
    }

    pub fn any_falling(&self) -> bool {
        self.edge == PoseLabel::Falling || self.foreground == PoseLabel::Falling
    }

    /// Single label for display: the first of falling, upright, sitting,
    /// lying, unrecognized that either view reported.
    pub fn summary(&self) -> PoseLabel {
        PoseLabel::DISPLAY_PRIORITY
            .into_iter()
            .find(|label| self.edge == *label || self.foreground == *label)
            .unwrap_or(PoseLabel::Unrecognized)
    }

    fn falling_count(&self) -> usize {
        usize::from(self.edge == PoseLabel::Falling)
            + usize::from(self.foreground == PoseLabel::Falling)
    }
}

#[derive(Clone, Debug)]
pub struct FrameHistory {
    bounds: FrameBounds,
    box_capacity: usize,
    boxes: VecDeque<BoundingBox>,
    pair_capacity: usize,
    pairs: VecDeque<ClassificationPair>,
}

impl FrameHistory {
    pub fn new(box_capacity: usize, pair_capacity: usize, bounds: FrameBounds) -> Self {
        Self {
            bounds,
            box_capacity,
            boxes: VecDeque::with_capacity(box_capacity),
            pair_capacity,
            pairs: VecDeque::with_capacity(pair_capacity),
        }
    }

    pub fn bounds(&self) -> FrameBounds {
        self.bounds
    }

    // ------------------------------------------------------------------
    // Bounding boxes
    // ------------------------------------------------------------------

    /// Admit a box. Fails when the window is full; evict first.
    pub fn add_box(&mut self, bounding_box: BoundingBox) -> Result<()> {
        if self.boxes.len() >= self.box_capacity {
            return Err(anyhow!(
                "bounding box window full ({} entries); evict before adding",
                self.box_capacity
            ));
        }
        self.boxes.push_back(bounding_box);
        Ok(())
    }

    /// Drop the `count` oldest boxes (all of them if fewer are held).
    pub fn evict_oldest_boxes(&mut self, count: usize) {
        let count = count.min(self.boxes.len());
        self.boxes.drain(..count);
    }

    pub fn is_box_window_full(&self) -> bool {
        self.boxes.len() == self.box_capacity
    }

    /// Evict one box if the window is full, then admit `bounding_box`.
    pub fn push_box(&mut self, bounding_box: BoundingBox) -> Result<()> {
        if self.is_box_window_full() {
            self.evict_oldest_boxes(1);
        }
        self.add_box(bounding_box)
    }

    /// Overwrite the most recent box, e.g. after occlusion correction.
    pub fn replace_newest_box(&mut self, bounding_box: BoundingBox) -> Result<()> {
        let newest = self
            .boxes
            .back_mut()
            .ok_or_else(|| anyhow!("no bounding box to replace in an empty window"))?;
        *newest = bounding_box;
        Ok(())
    }

    pub fn boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.boxes.iter()
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    /// Truncating mean width and height over the box window.
    pub fn average_dimensions(&self) -> Result<(u32, u32)> {
        if self.boxes.is_empty() {
            return Err(anyhow!("average requested over an empty bounding box window"));
        }
        let count = self.boxes.len() as u64;
        let (width_sum, height_sum) = self.boxes.iter().fold((0u64, 0u64), |(w, h), b| {
            (w + u64::from(b.width()), h + u64::from(b.height()))
        });
        Ok(((width_sum / count) as u32, (height_sum / count) as u32))
    }

    /// Product of the average width and height, not the mean of the areas.
    pub fn average_area(&self) -> Result<u64> {
        let (width, height) = self.average_dimensions()?;
        Ok(u64::from(width) * u64::from(height))
    }

    /// True when no box in the window is larger than the one before it,
    /// starting from the full-frame area. A sustained shrink means the
    /// detection is trending away rather than being briefly obstructed.
    pub fn is_continuously_decreasing(&self) -> bool {
        let mut previous = self.bounds.area();
        for bounding_box in &self.boxes {
            let area = bounding_box.area();
            if area > previous {
                return false;
            }
            previous = area;
        }
        true
    }

    // ------------------------------------------------------------------
    // Classification pairs
    // ------------------------------------------------------------------

    /// Admit a pair. Fails when the window is full; evict first.
    pub fn add_classification_pair(&mut self, pair: ClassificationPair) -> Result<()> {
        if self.pairs.len() >= self.pair_capacity {
            return Err(anyhow!(
                "classification window full ({} entries); evict before adding",
                self.pair_capacity
            ));
        }
        self.pairs.push_back(pair);
        Ok(())
    }

    pub fn evict_oldest_pairs(&mut self, count: usize) {
        let count = count.min(self.pairs.len());
        self.pairs.drain(..count);
    }

    pub fn is_classification_window_full(&self) -> bool {
        self.pairs.len() == self.pair_capacity
    }

    pub fn push_classification_pair(&mut self, pair: ClassificationPair) -> Result<()> {
        if self.is_classification_window_full() {
            self.evict_oldest_pairs(1);
        }
        self.add_classification_pair(pair)
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// True when falling labels make up strictly more than half of all
    /// labels (two per pair) in the classification window.
    pub fn majority_falling(&self) -> bool {
        let total_labels = self.pairs.len() * 2;
        if total_labels == 0 {
            return false;
        }
        let falling: usize = self.pairs.iter().map(ClassificationPair::falling_count).sum();
        falling * 2 > total_labels
    }
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_WINDOW, FrameBounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: i32) -> BoundingBox {
        BoundingBox::new(0, side, 0, side)
    }

    fn boxes_with_areas(areas: &[(i32, i32)]) -> FrameHistory {
        let mut history = FrameHistory::new(areas.len(), 1, FrameBounds::default());
        for &(w, h) in areas {
            history.add_box(BoundingBox::new(0, w, 0, h)).unwrap();
        }
        history
    }

    #[test]
    fn add_rejects_when_full() {
        let mut history = FrameHistory::new(2, 2, FrameBounds::default());
        history.add_box(square(10)).unwrap();
        history.add_box(square(20)).unwrap();
        assert!(history.is_box_window_full());
        assert!(history.add_box(square(30)).is_err());
        assert_eq!(history.box_count(), 2);
    }

    #[test]
    fn push_evicts_oldest_first() {
        let mut history = FrameHistory::new(3, 3, FrameBounds::default());
        for side in [10, 20, 30, 40, 50] {
            history.push_box(square(side)).unwrap();
            assert!(history.box_count() <= 3);
        }
        let widths: Vec<u32> = history.boxes().map(|b| b.width()).collect();
        assert_eq!(widths, vec![30, 40, 50]);
    }

    #[test]
    fn replacing_newest_keeps_older_entries() {
        let mut history = FrameHistory::new(3, 3, FrameBounds::default());
        assert!(history.replace_newest_box(square(10)).is_err());
        history.push_box(square(10)).unwrap();
        history.push_box(square(20)).unwrap();
        history.replace_newest_box(square(15)).unwrap();
        let widths: Vec<u32> = history.boxes().map(|b| b.width()).collect();
        assert_eq!(widths, vec![10, 15]);
    }

    #[test]
    fn evicting_more_than_held_empties_window() {
        let mut history = FrameHistory::new(3, 3, FrameBounds::default());
        history.push_box(square(10)).unwrap();
        history.evict_oldest_boxes(5);
        assert_eq!(history.box_count(), 0);
    }

    #[test]
    fn averages_truncate() {
        // Areas 100, 200, 300 as 10x10, 10x20, 10x30.
        let history = boxes_with_areas(&[(10, 10), (10, 20), (10, 30)]);
        assert_eq!(history.average_dimensions().unwrap(), (10, 20));
        assert_eq!(history.average_area().unwrap(), 200);

        // Areas 100, 200, 300 as 10x10, 20x10, 15x20: mean of areas would be 200.
        let history = boxes_with_areas(&[(10, 10), (20, 10), (15, 20)]);
        assert_eq!(history.average_dimensions().unwrap(), (15, 13));
        assert_eq!(history.average_area().unwrap(), 195);
    }

    #[test]
    fn average_of_empty_window_fails() {
        let history = FrameHistory::default();
        assert!(history.average_dimensions().is_err());
        assert!(history.average_area().is_err());
    }

    #[test]
    fn continuous_decrease_detection() {
        // 500, 400, 300
        let shrinking = boxes_with_areas(&[(10, 50), (10, 40), (10, 30)]);
        assert!(shrinking.is_continuously_decreasing());

        // 300, 400, 200
        let bouncing = boxes_with_areas(&[(10, 30), (10, 40), (10, 20)]);
        assert!(!bouncing.is_continuously_decreasing());

        let flat = boxes_with_areas(&[(10, 30), (10, 30)]);
        assert!(flat.is_continuously_decreasing());

        assert!(FrameHistory::default().is_continuously_decreasing());
    }

    #[test]
    fn classification_window_is_bounded() {
        let mut history = FrameHistory::new(1, 2, FrameBounds::default());
        let pair = ClassificationPair::new(PoseLabel::Upright, PoseLabel::Upright);
        history.add_classification_pair(pair).unwrap();
        history.add_classification_pair(pair).unwrap();
        assert!(history.is_classification_window_full());
        assert!(history.add_classification_pair(pair).is_err());
        history.push_classification_pair(pair).unwrap();
        assert_eq!(history.pair_count(), 2);
    }

    #[test]
    fn majority_falling_counts_labels() {
        let mut history = FrameHistory::new(1, 4, FrameBounds::default());
        assert!(!history.majority_falling());

        let falling = ClassificationPair::new(PoseLabel::Falling, PoseLabel::Falling);
        let mixed = ClassificationPair::new(PoseLabel::Falling, PoseLabel::Lying);
        let upright = ClassificationPair::new(PoseLabel::Upright, PoseLabel::Upright);

        history.push_classification_pair(mixed).unwrap();
        // 1 of 2 labels: exactly half is not a majority.
        assert!(!history.majority_falling());

        history.push_classification_pair(falling).unwrap();
        assert!(history.majority_falling());

        history.push_classification_pair(upright).unwrap();
        history.push_classification_pair(upright).unwrap();
        // 3 of 8 labels.
        assert!(!history.majority_falling());
    }

    #[test]
    fn pair_summary_priority() {
        let pair = ClassificationPair::new(PoseLabel::Sitting, PoseLabel::Falling);
        assert_eq!(pair.summary(), PoseLabel::Falling);
        assert!(pair.any_falling());

        let pair = ClassificationPair::new(PoseLabel::Lying, PoseLabel::Upright);
        assert_eq!(pair.summary(), PoseLabel::Upright);
        assert!(!pair.any_falling());
    }
}
