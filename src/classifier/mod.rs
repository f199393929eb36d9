//! Pose classification.
//!
//! A classifier turns one fixed-shape feature image (an edge or silhouette
//! crop of the tracked subject) into a [`PoseLabel`]. The session holds two
//! classifiers with the same algorithm and different training sets, one per
//! [`Characteristic`](crate::Characteristic).

mod feature;
mod knn;
mod training;

pub use feature::{FeatureImage, FEATURE_HEIGHT, FEATURE_WIDTH};
pub use knn::{euclidean_distance, KNeighborsClassifier, CONFIDENCE_FLOOR, DEFAULT_K};
pub use training::TrainingSet;

use crate::PoseLabel;

/// A pose classifier.
///
/// An absent query (no crop this frame) must yield
/// [`PoseLabel::Unrecognized`] rather than an error.
pub trait PoseClassifier {
    fn classify(&self, query: Option<&FeatureImage>) -> PoseLabel;
}

impl<C: PoseClassifier + ?Sized> PoseClassifier for &C {
    fn classify(&self, query: Option<&FeatureImage>) -> PoseLabel {
        (**self).classify(query)
    }
}

impl<C: PoseClassifier + ?Sized> PoseClassifier for Box<C> {
    fn classify(&self, query: Option<&FeatureImage>) -> PoseLabel {
        (**self).classify(query)
    }
}
