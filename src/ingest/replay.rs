//! Replay frame source.
//!
//! Cycles through a fixed list of frames, either decoded from local JPEG
//! stills or handed in directly. Leading failures can be scripted to exercise
//! the caller's retry path.

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct ReplaySource {
    name: String,
    frames: Vec<Frame>,
    cursor: usize,
    pending_failures: u32,
    frames_captured: u64,
    failures: u64,
    stopped: bool,
}

impl ReplaySource {
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(anyhow!("replay source needs at least one frame"));
        }
        Ok(Self {
            name: format!("replay:{}", frames.len()),
            frames,
            cursor: 0,
            pending_failures: 0,
            frames_captured: 0,
            failures: 0,
            stopped: false,
        })
    }

    /// Decode local JPEG stills. Paths must be local files (no URL schemes).
    pub fn from_jpeg_files(paths: &[&str]) -> Result<Self> {
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            if path.contains("://") {
                return Err(anyhow!("replay only supports local paths, got {}", path));
            }
            let rgb = image::open(path)
                .with_context(|| format!("decode replay still {}", path))?
                .to_rgb8();
            let (width, height) = rgb.dimensions();
            frames.push(Frame::from_rgb(rgb.into_raw(), width, height)?);
        }
        let mut source = Self::new(frames)?;
        source.name = format!("replay:{}", paths.join(","));
        Ok(source)
    }

    /// Fail the next `count` captures before yielding frames.
    pub fn with_leading_failures(mut self, count: u32) -> Self {
        self.pending_failures = count;
        self
    }
}

impl FrameSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture_frame(&mut self) -> Result<Frame> {
        if self.stopped {
            return Err(anyhow!("replay source stopped"));
        }
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            self.failures += 1;
            return Err(anyhow!("scripted capture failure"));
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        self.frames_captured += 1;
        Ok(frame)
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            capture_failures: self.failures,
            source: self.name.clone(),
        }
    }
}
