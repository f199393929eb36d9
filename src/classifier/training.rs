use std::collections::BTreeMap;

use super::FeatureImage;
use crate::PoseLabel;

/// Reference images per pose label for one characteristic.
///
/// Iteration order is the canonical label order (upright, falling, sitting,
/// lying), then insertion order within a label.
#[derive(Clone, Debug, Default)]
pub struct TrainingSet {
    examples: BTreeMap<PoseLabel, Vec<FeatureImage>>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference image. `Unrecognized` is not a trainable label and
    /// is ignored.
    pub fn insert(&mut self, label: PoseLabel, image: FeatureImage) {
        if !label.is_trainable() {
            log::warn!("ignoring template labelled {}", label);
            return;
        }
        self.examples.entry(label).or_default().push(image);
    }

    pub fn extend<I: IntoIterator<Item = FeatureImage>>(&mut self, label: PoseLabel, images: I) {
        for image in images {
            self.insert(label, image);
        }
    }

    pub fn examples(&self, label: PoseLabel) -> &[FeatureImage] {
        self.examples.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every example with its label.
    pub fn iter(&self) -> impl Iterator<Item = (PoseLabel, &FeatureImage)> {
        self.examples
            .iter()
            .flat_map(|(label, images)| images.iter().map(move |image| (*label, image)))
    }

    pub fn len(&self) -> usize {
        self.examples.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Example count per trainable label, zero-filled.
    pub fn counts(&self) -> Vec<(PoseLabel, usize)> {
        PoseLabel::TRAINABLE
            .iter()
            .map(|label| (*label, self.examples(*label).len()))
            .collect()
    }
}
