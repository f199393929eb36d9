//! fallwatch
//!
//! Temporal fall-detection engine for a single tracked subject in a video
//! stream.
//!
//! # Architecture
//!
//! Each frame flows through the same pipeline:
//!
//! 1. **Segmentation**: an [`ImagePipeline`] produces a foreground mask and the
//!    bounding box of the largest moving region.
//! 2. **Tracking**: [`FrameHistory`] keeps a short window of recent boxes. A box
//!    that suddenly shrinks below the window average, while the window is not in
//!    a sustained shrink, is treated as occluded and restored to the average
//!    size around its center.
//! 3. **Classification**: edge and foreground crops of the box are classified
//!    independently by weighted k-nearest-neighbour over stored templates.
//! 4. **Aggregation**: frames where either view reports `falling` are counted;
//!    the session reports a fall when the count exceeds a threshold.
//!
//! # Module Structure
//!
//! - `geometry`, `history`: box arithmetic and sliding windows
//! - `frame`: frames and per-frame derived state
//! - `vision`: the image pipeline trait and its backends
//! - `classifier`: feature images, training sets, k-NN
//! - `session`: the per-frame state machine and the verdict
//! - `storage`, `ingest`, `overlay`: template store, frame sources, annotated output
//! - `config`, `cli`, `ui`: configuration and the command-line front end

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod classifier;
pub mod cli;
pub mod config;
pub mod frame;
pub mod geometry;
pub mod history;
pub mod ingest;
pub mod overlay;
pub mod session;
pub mod storage;
pub mod ui;
pub mod vision;

pub use classifier::{
    euclidean_distance, FeatureImage, KNeighborsClassifier, PoseClassifier, TrainingSet,
    CONFIDENCE_FLOOR, DEFAULT_K, FEATURE_HEIGHT, FEATURE_WIDTH,
};
pub use config::FallwatchConfig;
pub use frame::{dynamic_kernel_size, Frame, FrameState, CROP_MIN_AREA, DETECTION_KERNEL_SIZE};
pub use geometry::{AspectHint, BoundingBox, FrameBounds, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use history::{ClassificationPair, FrameHistory};
pub use ingest::{open_source, DirectorySource, FrameSource, SourceStats, SyntheticSource};
pub use session::{
    run_session, ClassifierPair, FallSession, FrameOutcome, FramePhase, SessionConfig,
    SessionVerdict,
};
pub use storage::{
    import_local_templates, open_store, FilesystemTemplateStore, ImportReport,
    InMemoryTemplateStore, SqliteTemplateStore, StoreKind, TemplateCapture, TemplateLibrary,
    TemplateRecord, TemplateStore,
};
pub use vision::{select_pipeline, CpuPipeline, ImagePipeline, ScriptedPipeline};

// -------------------- Pose Labels --------------------

/// Discrete posture reported by a classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseLabel {
    Upright,
    Falling,
    Sitting,
    Lying,
    Unrecognized,
}

impl PoseLabel {
    /// Labels that templates can be stored under, in canonical order.
    pub const TRAINABLE: [PoseLabel; 4] = [
        PoseLabel::Upright,
        PoseLabel::Falling,
        PoseLabel::Sitting,
        PoseLabel::Lying,
    ];

    /// Order used when collapsing a pair of labels into one for display.
    pub const DISPLAY_PRIORITY: [PoseLabel; 5] = [
        PoseLabel::Falling,
        PoseLabel::Upright,
        PoseLabel::Sitting,
        PoseLabel::Lying,
        PoseLabel::Unrecognized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoseLabel::Upright => "upright",
            PoseLabel::Falling => "falling",
            PoseLabel::Sitting => "sitting",
            PoseLabel::Lying => "lying",
            PoseLabel::Unrecognized => "unrecognized",
        }
    }

    pub fn is_trainable(&self) -> bool {
        !matches!(self, PoseLabel::Unrecognized)
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoseLabel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upright" => Ok(PoseLabel::Upright),
            "falling" => Ok(PoseLabel::Falling),
            "sitting" => Ok(PoseLabel::Sitting),
            "lying" => Ok(PoseLabel::Lying),
            "unrecognized" => Ok(PoseLabel::Unrecognized),
            other => Err(anyhow!("unknown pose label '{}'", other)),
        }
    }
}

// -------------------- Characteristics --------------------

/// One of the two parallel image views classified for each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Characteristic {
    /// Edge map of the frame, masked to the moving region.
    Edge,
    /// Background-subtracted silhouette.
    Foreground,
}

impl Characteristic {
    pub const ALL: [Characteristic; 2] = [Characteristic::Edge, Characteristic::Foreground];

    pub fn as_str(&self) -> &'static str {
        match self {
            Characteristic::Edge => "edge",
            Characteristic::Foreground => "foreground",
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Characteristic {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "edge" => Ok(Characteristic::Edge),
            "foreground" => Ok(Characteristic::Foreground),
            other => Err(anyhow!("unknown template characteristic '{}'", other)),
        }
    }
}
