//! Line vision: colour segmentation of the band nearest the robot and blob
//! analysis for the line follower.
//!
//! With the `vision-opencv` feature the band is segmented by OpenCV
//! (`cvt_color`, `in_range`, morphology, `find_contours`). Without it a
//! portable raster segmenter produces the same blob types.

mod color;
#[cfg(feature = "vision-opencv")]
pub(crate) mod cv;
mod line;
#[cfg(not(feature = "vision-opencv"))]
mod raster;

pub use color::{HsvRange, LineColorProfile, PRESET_NAMES};
pub use line::{Blob, LineDetection, LineExtraction, LineExtractor, LineExtractorConfig, Moments};
