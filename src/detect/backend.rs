use anyhow::Result;

use super::result::FaceBox;

/// Face-detection capability consumed by the face tracker.
///
/// Locators receive the grayscale view of the current frame (one byte per
/// pixel, row-major) and return boxes in the same pixel coordinates. Order
/// matters: the tracker follows the first box.
pub trait FaceLocator: Send {
    /// Locator identifier for logs.
    fn name(&self) -> &'static str;

    fn detect_faces(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>>;

    /// Optional warm-up hook, run once when the locator is loaded.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
