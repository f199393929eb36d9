//! Frame ingestion sources.
//!
//! A source yields decoded frames one at a time until it is exhausted:
//! - a directory of still frames (`png`/`jpg`, in file-name order)
//! - a synthetic `stub://` scene (testing and demos)
//!
//! Sources are pulled synchronously by the session loop. Every frame is
//! delivered at the configured frame bounds.

mod dir;
mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::geometry::FrameBounds;

pub use dir::DirectorySource;
pub use synthetic::{SyntheticSource, DEFAULT_SYNTHETIC_FRAMES};

/// A pull-based frame source.
pub trait FrameSource {
    /// Prepare the source. Must be called before the first `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub uri: String,
}

/// Open a source by URI: `stub://...` for the synthetic scene, anything
/// else without a scheme is a local directory. `limit` caps the number of
/// frames delivered.
pub fn open_source(uri: &str, bounds: FrameBounds, limit: Option<u64>) -> Result<Box<dyn FrameSource>> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("frame source URI is empty"));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(uri, bounds, limit)));
    }
    if uri.contains("://") {
        return Err(anyhow!(
            "unsupported frame source '{}': only local directories and stub:// are supported",
            uri
        ));
    }
    Ok(Box::new(DirectorySource::new(uri, bounds, limit)))
}
