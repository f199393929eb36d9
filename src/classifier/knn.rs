//! Weighted k-nearest-neighbour over feature images.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{FeatureImage, PoseClassifier, TrainingSet};
use crate::PoseLabel;

/// Neighbour count used when none is configured.
pub const DEFAULT_K: usize = 5;

/// Winning scores below this are reported as `Unrecognized`.
pub const CONFIDENCE_FLOOR: f64 = 0.0008;

/// Distance reported when either operand is missing.
const MISSING_OPERAND_DISTANCE: f64 = 1.0;

/// Vote weight of an exact match.
const EXACT_MATCH_WEIGHT: f64 = 1.0;

/// L2 distance between two images over their flattened pixels.
///
/// Returns exactly 1.0 when either side is absent. Images of different
/// shapes are not comparable and are treated the same way.
pub fn euclidean_distance(source: Option<&FeatureImage>, target: Option<&FeatureImage>) -> f64 {
    let (Some(source), Some(target)) = (source, target) else {
        return MISSING_OPERAND_DISTANCE;
    };
    if (source.width(), source.height()) != (target.width(), target.height()) {
        return MISSING_OPERAND_DISTANCE;
    }
    source
        .pixels()
        .iter()
        .zip(target.pixels())
        .map(|(a, b)| {
            let diff = f64::from(*a) - f64::from(*b);
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

/// Candidate neighbour ordered by distance, so the heap top is the worst kept.
#[derive(Clone, Copy, Debug)]
struct Neighbor {
    distance: f64,
    label: PoseLabel,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance)
    }
}

#[derive(Clone, Debug)]
pub struct KNeighborsClassifier {
    training: TrainingSet,
    k: usize,
}

impl KNeighborsClassifier {
    pub fn new(training: TrainingSet, k: usize) -> Self {
        Self { training, k: k.max(1) }
    }

    pub fn with_default_k(training: TrainingSet) -> Self {
        Self::new(training, DEFAULT_K)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn set_k(&mut self, k: usize) {
        self.k = k.max(1);
    }

    pub fn training_set(&self) -> &TrainingSet {
        &self.training
    }

    pub fn set_training_set(&mut self, training: TrainingSet) {
        self.training = training;
    }

    /// The k closest training examples, closest first.
    fn nearest(&self, query: &FeatureImage) -> Vec<Neighbor> {
        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(self.k + 1);
        for (label, example) in self.training.iter() {
            let candidate = Neighbor {
                distance: euclidean_distance(Some(query), Some(example)),
                label,
            };
            if heap.len() < self.k {
                heap.push(candidate);
            } else if let Some(mut worst) = heap.peek_mut() {
                if candidate.distance < worst.distance {
                    *worst = candidate;
                }
            }
        }
        heap.into_sorted_vec()
    }

    /// Accumulated `1/distance` scores per trainable label, canonical order.
    fn scores(&self, neighbors: &[Neighbor]) -> [(PoseLabel, f64); 4] {
        let mut scores = PoseLabel::TRAINABLE.map(|label| (label, 0.0));
        for neighbor in neighbors {
            let weight = if neighbor.distance == 0.0 {
                EXACT_MATCH_WEIGHT
            } else {
                1.0 / neighbor.distance
            };
            if let Some(slot) = scores.iter_mut().find(|(label, _)| *label == neighbor.label) {
                slot.1 += weight;
            }
        }
        scores
    }
}

impl PoseClassifier for KNeighborsClassifier {
    fn classify(&self, query: Option<&FeatureImage>) -> PoseLabel {
        let Some(query) = query else {
            return PoseLabel::Unrecognized;
        };
        let neighbors = self.nearest(query);
        if neighbors.is_empty() {
            return PoseLabel::Unrecognized;
        }

        // Strict comparison keeps the earliest label on ties.
        let mut best = (PoseLabel::Unrecognized, f64::NEG_INFINITY);
        for (label, score) in self.scores(&neighbors) {
            if score > best.1 {
                best = (label, score);
            }
        }

        if best.1 < CONFIDENCE_FLOOR {
            PoseLabel::Unrecognized
        } else {
            best.0
        }
    }
}
