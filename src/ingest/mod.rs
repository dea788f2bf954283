//! Frame sources.
//!
//! This module provides the camera seam of the control loop:
//! - Synthetic scenes (`stub://line`, `stub://junction`, `stub://blank`)
//! - JPEG still replay (comma-separated `.jpg` paths)
//! - USB/V4L2 devices (feature: camera-v4l2)
//!
//! All sources produce RGB24 `Frame`s at the configured resolution. Capture is
//! allowed to fail transiently; retry and backoff belong to the caller.

#[cfg(feature = "camera-v4l2")]
mod normalize;
pub mod replay;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Source;

/// Camera abstraction consumed by the scheduler.
pub trait FrameSource: Send {
    /// Human-readable source identifier for logs.
    fn name(&self) -> &str;

    /// Open the underlying device. Synthetic sources are always connected.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Capture the next frame. May fail transiently.
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Release the device. Further captures fail.
    fn stop(&mut self) -> Result<()>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub source: String,
}

/// Configuration for opening a frame source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// `stub://<scene>`, comma-separated JPEG paths, or a device path such as `/dev/video0`.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Probability of an injected transient failure (synthetic sources only).
    pub failure_rate: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "stub://line".to_string(),
            width: 320,
            height: 240,
            target_fps: 50,
            failure_rate: 0.0,
        }
    }
}

/// Open and connect the source named by `config.source`.
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    let mut source: Box<dyn FrameSource> = if config.source.starts_with("stub://") {
        Box::new(SyntheticSource::new(config.clone())?)
    } else if is_jpeg_list(&config.source) {
        let paths: Vec<&str> = config
            .source
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        Box::new(ReplaySource::from_jpeg_files(&paths)?)
    } else if config.source.starts_with("/dev/") {
        open_device(config)?
    } else {
        return Err(anyhow!("unsupported camera source '{}'", config.source));
    };
    source.connect()?;
    log::info!("camera source {} connected", source.name());
    Ok(source)
}

fn is_jpeg_list(source: &str) -> bool {
    source.split(',').map(str::trim).all(|p| {
        let lower = p.to_ascii_lowercase();
        lower.ends_with(".jpg") || lower.ends_with(".jpeg")
    })
}

#[cfg(feature = "camera-v4l2")]
fn open_device(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(config.clone())))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera device {} requires the camera-v4l2 feature",
        config.source
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_sources_open_connected() -> Result<()> {
        let mut source = open_source(&CameraConfig::default())?;
        let frame = source.capture_frame()?;
        assert_eq!((frame.width(), frame.height()), (320, 240));
        Ok(())
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let config = CameraConfig {
            source: "rtsp://camera".to_string(),
            ..CameraConfig::default()
        };
        assert!(open_source(&config).is_err());
    }

    #[test]
    fn jpeg_lists_are_recognised() {
        assert!(is_jpeg_list("a.jpg, b.JPEG"));
        assert!(!is_jpeg_list("a.jpg,b.png"));
    }
}
