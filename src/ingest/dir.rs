//! Local directory frame source.
//!
//! Reads still images from one directory in file-name order. Only files with
//! a `png`, `jpg` or `jpeg` extension are considered; anything else is
//! skipped. Frames whose size differs from the configured bounds are resized.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;
use crate::geometry::FrameBounds;

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct DirectorySource {
    path: PathBuf,
    bounds: FrameBounds,
    limit: Option<u64>,
    files: Vec<PathBuf>,
    cursor: usize,
    frames_captured: u64,
    connected: bool,
}

impl DirectorySource {
    pub fn new(path: impl AsRef<Path>, bounds: FrameBounds, limit: Option<u64>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            bounds,
            limit,
            files: Vec::new(),
            cursor: 0,
            frames_captured: 0,
            connected: false,
        }
    }

    /// Number of frame files found by `connect`.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.path)
            .with_context(|| format!("failed to read frame directory {}", self.path.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_frame_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "DirectorySource: connected to {} ({} frames)",
            self.path.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("DirectorySource: next_frame called before connect"));
        }
        if self.limit.is_some_and(|limit| self.frames_captured >= limit) {
            return Ok(None);
        }
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let mut image = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?
            .to_rgb8();
        if image.dimensions() != (self.bounds.width, self.bounds.height) {
            image = imageops::resize(&image, self.bounds.width, self.bounds.height, FilterType::Triangle);
        }

        let frame = Frame::new(self.frames_captured, image);
        self.frames_captured += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            uri: self.path.display().to_string(),
        }
    }
}
