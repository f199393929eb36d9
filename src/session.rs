//! Per-session fall decision loop.
//!
//! Each frame moves through at most three phases:
//!
//! ```text
//! NoMovement ──(box detected)──> MovementTracked ──┬──> OccludedSkip   (sustained shrink)
//!                                                  └──> ClassifyFrame  (box possibly corrected)
//! ```
//!
//! Frames that reach `ClassifyFrame` are classified by two classifiers, one
//! on the edge crop and one on the silhouette crop. A frame counts towards
//! the verdict when either reports `falling`; the session reports a fall
//! once more than `fall_frame_threshold` frames counted.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classifier::{FeatureImage, PoseClassifier};
use crate::frame::{Frame, FrameState};
use crate::geometry::{AspectHint, BoundingBox, FrameBounds};
use crate::history::{ClassificationPair, FrameHistory};
use crate::ingest::FrameSource;
use crate::overlay::OVERLAY_MIN_AREA;
use crate::vision::ImagePipeline;

/// Tunables for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the bounding-box window.
    pub box_window: usize,
    /// Capacity of the classification window.
    pub classification_window: usize,
    /// A fall is reported once strictly more frames than this were falling.
    pub fall_frame_threshold: u32,
    /// Run the classifiers on `ClassifyFrame` frames.
    pub classify: bool,
    pub bounds: FrameBounds,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            box_window: 5,
            classification_window: 5,
            fall_frame_threshold: 3,
            classify: true,
            bounds: FrameBounds::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePhase {
    /// Nothing moved; history untouched.
    NoMovement,
    /// A box was detected and recorded. Only seen on frames that never
    /// reached a decision.
    MovementTracked,
    /// The subject has been shrinking steadily; displayed but not classified.
    OccludedSkip,
    /// Crops taken and, if enabled, classified.
    ClassifyFrame,
}

/// Everything the loop decided about one frame.
#[derive(Clone, Debug, Serialize)]
pub struct FrameOutcome {
    pub index: u64,
    pub phase: FramePhase,
    /// Box as tracked after any occlusion correction.
    pub bounding_box: Option<BoundingBox>,
    /// True when the box was resized to the window average.
    pub corrected: bool,
    pub labels: Option<ClassificationPair>,
    /// Colour hint for the overlay, present only when a box should be drawn.
    pub overlay: Option<AspectHint>,
    /// Falling labels dominate the classification window.
    pub majority_falling: bool,
    #[serde(skip)]
    pub edge_crop: Option<FeatureImage>,
    #[serde(skip)]
    pub foreground_crop: Option<FeatureImage>,
}

impl FrameOutcome {
    fn new(index: u64, phase: FramePhase) -> Self {
        Self {
            index,
            phase,
            bounding_box: None,
            corrected: false,
            labels: None,
            overlay: None,
            majority_falling: false,
            edge_crop: None,
            foreground_crop: None,
        }
    }

    pub fn is_falling(&self) -> bool {
        self.labels.is_some_and(|pair| pair.any_falling())
    }
}

/// Session-level result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SessionVerdict {
    pub fall_detected: bool,
    pub fall_frames: u32,
    pub frames_processed: u64,
    pub classified_frames: u64,
    pub cancelled: bool,
}

/// Edge and foreground classifiers used together on each classified frame.
pub struct ClassifierPair {
    pub edge: Box<dyn PoseClassifier>,
    pub foreground: Box<dyn PoseClassifier>,
}

impl ClassifierPair {
    pub fn new<E, F>(edge: E, foreground: F) -> Self
    where
        E: PoseClassifier + 'static,
        F: PoseClassifier + 'static,
    {
        Self {
            edge: Box::new(edge),
            foreground: Box::new(foreground),
        }
    }

    fn classify(
        &self,
        edge: Option<&FeatureImage>,
        foreground: Option<&FeatureImage>,
    ) -> ClassificationPair {
        ClassificationPair::new(self.edge.classify(edge), self.foreground.classify(foreground))
    }
}

pub struct FallSession {
    config: SessionConfig,
    classifiers: ClassifierPair,
    history: FrameHistory,
    fall_frames: u32,
    frames_processed: u64,
    classified_frames: u64,
}

impl FallSession {
    pub fn new(config: SessionConfig, classifiers: ClassifierPair) -> Self {
        Self {
            history: Self::fresh_history(&config),
            config,
            classifiers,
            fall_frames: 0,
            frames_processed: 0,
            classified_frames: 0,
        }
    }

    fn fresh_history(config: &SessionConfig) -> FrameHistory {
        FrameHistory::new(config.box_window, config.classification_window, config.bounds)
    }

    /// Start over with empty windows and counters.
    pub fn reset(&mut self) {
        self.history = Self::fresh_history(&self.config);
        self.fall_frames = 0;
        self.frames_processed = 0;
        self.classified_frames = 0;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    pub fn fall_frames(&self) -> u32 {
        self.fall_frames
    }

    pub fn process_frame(&mut self, frame: &Frame, pipeline: &mut dyn ImagePipeline) -> Result<FrameOutcome> {
        self.frames_processed += 1;
        let mut state = FrameState::build(frame, pipeline)
            .with_context(|| format!("pipeline failed on frame {}", frame.index))?;

        let Some(detected) = state.bounding_box() else {
            return Ok(FrameOutcome::new(frame.index, FramePhase::NoMovement));
        };

        let mut outcome = FrameOutcome::new(frame.index, FramePhase::MovementTracked);
        outcome.bounding_box = Some(detected);
        self.history.push_box(detected)?;

        if self.history.is_continuously_decreasing() {
            log::debug!("frame {}: sustained shrink, skipping classification", frame.index);
            outcome.phase = FramePhase::OccludedSkip;
            return Ok(outcome);
        }

        let mut tracked = detected;
        if detected.area() < self.history.average_area()? {
            let (width, height) = self.history.average_dimensions()?;
            tracked.resize_around_center(width, height, self.config.bounds);
            self.history.replace_newest_box(tracked)?;
            state.set_bounding_box(tracked);
            outcome.corrected = true;
            log::debug!(
                "frame {}: occlusion correction {}x{} -> {}x{}",
                frame.index,
                detected.width(),
                detected.height(),
                tracked.width(),
                tracked.height()
            );
        }
        outcome.phase = FramePhase::ClassifyFrame;
        outcome.bounding_box = Some(tracked);
        if tracked.area() > OVERLAY_MIN_AREA {
            outcome.overlay = Some(tracked.aspect_hint());
        }

        outcome.edge_crop = state.extract_edges(frame, &*pipeline)?;
        outcome.foreground_crop = state.extract_foreground(&*pipeline)?;

        if self.config.classify {
            let pair = self
                .classifiers
                .classify(outcome.edge_crop.as_ref(), outcome.foreground_crop.as_ref());
            self.classified_frames += 1;
            if pair.any_falling() {
                self.fall_frames += 1;
            }
            self.history.push_classification_pair(pair)?;
            outcome.labels = Some(pair);
            outcome.majority_falling = self.history.majority_falling();
            log::info!(
                "frame {}: edge={} foreground={} -> {}",
                frame.index,
                pair.edge,
                pair.foreground,
                pair.summary()
            );
        }

        Ok(outcome)
    }

    pub fn verdict(&self) -> SessionVerdict {
        SessionVerdict {
            fall_detected: self.fall_frames > self.config.fall_frame_threshold,
            fall_frames: self.fall_frames,
            frames_processed: self.frames_processed,
            classified_frames: self.classified_frames,
            cancelled: false,
        }
    }
}

/// Pull frames until the source is exhausted or `cancel` is set.
///
/// Each frame is fully processed and handed to `observer` before the
/// cancellation flag is polled. Errors from the source, the pipeline or the
/// observer abort the session.
pub fn run_session<F>(
    source: &mut dyn FrameSource,
    pipeline: &mut dyn ImagePipeline,
    session: &mut FallSession,
    cancel: &AtomicBool,
    mut observer: F,
) -> Result<SessionVerdict>
where
    F: FnMut(&Frame, &FrameOutcome) -> Result<()>,
{
    let mut cancelled = false;
    while let Some(frame) = source.next_frame()? {
        let outcome = session.process_frame(&frame, pipeline)?;
        observer(&frame, &outcome)?;
        if cancel.load(Ordering::SeqCst) {
            log::info!("session cancelled after frame {}", frame.index);
            cancelled = true;
            break;
        }
    }

    let mut verdict = session.verdict();
    verdict.cancelled = cancelled;
    log::info!(
        "session finished: {} frames, {} classified, {} falling, fall_detected={}",
        verdict.frames_processed,
        verdict.classified_frames,
        verdict.fall_frames,
        verdict.fall_detected
    );
    Ok(verdict)
}
